//! Resumable render state: everything needed to continue a render
//! deterministically after a process restart.

use std::fs;

use serde::{Deserialize, Serialize};

use crate::engine::tilerepository::TileRepositoryState;
use crate::error::{RenderError, Result};

const STATE_MAGIC: u32 = 0x454d_5253;
const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderState {
    magic: u32,
    version: u32,
    pub engine_tag: String,
    pub seed_base: u64,
    pub tile_state: Option<TileRepositoryState>,
    pub dlsc_file: Option<String>,
}

impl RenderState {
    pub fn new(engine_tag: &str, seed_base: u64) -> RenderState {
        RenderState {
            magic: STATE_MAGIC,
            version: STATE_VERSION,
            engine_tag: engine_tag.to_string(),
            seed_base,
            tile_state: None,
            dlsc_file: None,
        }
    }

    pub fn check_engine_tag(&self, tag: &str) -> Result<()> {
        if self.engine_tag != tag {
            return Err(RenderError::config(
                "renderengine.type",
                format!(
                    "render state was saved by engine {:?}, not {:?}",
                    self.engine_tag, tag
                ),
            ));
        }
        Ok(())
    }

    pub fn save(&self, file_name: &str) -> Result<()> {
        let bytes = bincode::serialize(self)
            .map_err(|e| RenderError::Cache(format!("render state serialization: {}", e)))?;
        let tmp_name = format!("{}.tmp", file_name);
        fs::write(&tmp_name, &bytes)?;
        fs::rename(&tmp_name, file_name)?;
        Ok(())
    }

    pub fn load(file_name: &str) -> Result<RenderState> {
        let bytes = fs::read(file_name)?;
        let state: RenderState = bincode::deserialize(&bytes)
            .map_err(|e| RenderError::Cache(format!("corrupted render state: {}", e)))?;
        if state.magic != STATE_MAGIC || state.version != STATE_VERSION {
            return Err(RenderError::Cache(
                "render state version mismatch".to_string(),
            ));
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_check() {
        let state = RenderState::new("TILEPATHCPU", 42);
        assert!(state.check_engine_tag("TILEPATHCPU").is_ok());
        assert!(state.check_engine_tag("PATHCPU").is_err());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.rst");
        let path = path.to_str().unwrap();

        let mut state = RenderState::new("PATHCPU", 7);
        state.dlsc_file = Some("cache.dlsc".to_string());
        state.save(path).unwrap();

        let loaded = RenderState::load(path).unwrap();
        assert_eq!(loaded.engine_tag, "PATHCPU");
        assert_eq!(loaded.seed_base, 7);
        assert_eq!(loaded.dlsc_file.as_deref(), Some("cache.dlsc"));
    }

    #[test]
    fn test_corrupt_state_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.rst");
        fs::write(&path, b"not a render state").unwrap();
        assert!(RenderState::load(path.to_str().unwrap()).is_err());
    }
}
