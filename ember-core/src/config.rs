//! Flat key–value render configuration with dotted keys, e.g.
//! `path.pathdepth.total = 8`. Unknown keys are tolerated at parse time and
//! stay reachable through the query API.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{RenderError, Result};

#[derive(Debug, Clone, Default)]
pub struct Properties {
    values: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Properties {
        Properties::default()
    }

    /// Parse `key = value` lines. `#` starts a comment; blank lines are
    /// skipped.
    pub fn from_str_lines(text: &str) -> Result<Properties> {
        let mut props = Properties::new();
        for (line_number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut split = line.splitn(2, '=');
            let key = split.next().unwrap_or("").trim();
            let value = split.next().map(str::trim);
            match value {
                Some(value) if !key.is_empty() => {
                    props.set(key, value);
                }
                _ => {
                    return Err(RenderError::config(
                        key,
                        format!("malformed line {}", line_number + 1),
                    ));
                }
            }
        }
        Ok(props)
    }

    pub fn set<K: Into<String>, V: fmt::Display>(&mut self, key: K, value: V) -> &mut Properties {
        self.values.insert(key.into(), value.to_string());
        self
    }

    /// Raw access, also for keys the engine does not recognize.
    pub fn get_raw(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.values
            .keys()
            .filter(move |k| k.starts_with(prefix))
            .map(String::as_str)
    }

    fn get_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
                RenderError::config(key, format!("can not parse value {:?}", raw))
            }),
        }
    }

    pub fn get_f32(&self, key: &str, default: f32) -> Result<f32> {
        Ok(self.get_parsed::<f32>(key)?.unwrap_or(default))
    }

    pub fn get_u32(&self, key: &str, default: u32) -> Result<u32> {
        Ok(self.get_parsed::<u32>(key)?.unwrap_or(default))
    }

    pub fn get_u64(&self, key: &str, default: u64) -> Result<u64> {
        Ok(self.get_parsed::<u64>(key)?.unwrap_or(default))
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.values.get(key) {
            None => Ok(default),
            Some(raw) => match raw.as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                other => Err(RenderError::config(
                    key,
                    format!("expected a boolean, got {:?}", other),
                )),
            },
        }
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.values
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    /// Like `get_f32` but rejects values outside `[low, high]`.
    pub fn get_f32_in_range(&self, key: &str, default: f32, low: f32, high: f32) -> Result<f32> {
        let v = self.get_f32(key, default)?;
        if v < low || v > high {
            return Err(RenderError::config(
                key,
                format!("value {} outside [{}, {}]", v, low, high),
            ));
        }
        Ok(v)
    }
}

impl fmt::Display for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, v) in &self.values {
            writeln!(f, "{} = {}", k, v)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_query() {
        let props = Properties::from_str_lines(
            "# comment\n\
             renderengine.type = PATHCPU\n\
             sampler.sobol.bucketsize = 32\n\
             path.clamping.variance.maxvalue = 2.5\n",
        )
        .unwrap();
        assert_eq!(props.get_string("renderengine.type", "SOBOL"), "PATHCPU");
        assert_eq!(props.get_u32("sampler.sobol.bucketsize", 16).unwrap(), 32);
        assert_eq!(
            props
                .get_f32("path.clamping.variance.maxvalue", 0.0)
                .unwrap(),
            2.5
        );
        // defaults
        assert_eq!(props.get_u32("sampler.sobol.tilesize", 16).unwrap(), 16);
    }

    #[test]
    fn test_unknown_keys_are_queryable() {
        let props = Properties::from_str_lines("some.plugin.key = whatever\n").unwrap();
        assert_eq!(props.get_raw("some.plugin.key"), Some("whatever"));
        assert_eq!(
            props.keys_with_prefix("some.").collect::<Vec<_>>(),
            vec!["some.plugin.key"]
        );
    }

    #[test]
    fn test_bad_numeric() {
        let props = Properties::from_str_lines("sampler.sobol.bucketsize = banana\n").unwrap();
        assert!(props.get_u32("sampler.sobol.bucketsize", 16).is_err());
    }

    #[test]
    fn test_range_check() {
        let mut props = Properties::new();
        props.set("sampler.sobol.adaptive.strength", 1.5);
        assert!(props
            .get_f32_in_range("sampler.sobol.adaptive.strength", 0.95, 0.0, 0.95)
            .is_err());
    }
}
