use quick_error::quick_error;

quick_error! {
    #[derive(Debug)]
    pub enum RenderError {
        /// Unknown enum value, out-of-range numeric or missing required key.
        Config(key: String, msg: String) {
            display("invalid configuration key {:?}: {}", key, msg)
        }
        /// No lights when one is required, empty visible region, invalid
        /// geometry.
        Scene(msg: String) {
            display("scene error: {}", msg)
        }
        /// Persistent cache corrupted or version-mismatched. Recoverable by
        /// rebuilding the cache.
        Cache(msg: String) {
            display("cache error: {}", msg)
        }
        /// Cooperative interrupt was observed inside a long operation.
        Cancelled {
            display("operation cancelled")
        }
        /// NaN/Inf detected in throughput or radiance.
        Numerical(msg: String) {
            display("numerical error: {}", msg)
        }
        Io(err: std::io::Error) {
            from()
            display("I/O error: {}", err)
            source(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;

impl RenderError {
    pub fn config<K: Into<String>, M: Into<String>>(key: K, msg: M) -> RenderError {
        RenderError::Config(key.into(), msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = RenderError::config("sampler.type", "unknown value FOO");
        assert!(e.to_string().contains("sampler.type"));
    }
}
