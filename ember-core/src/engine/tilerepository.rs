//! Concurrent queue of film tiles for the tiled render engine. When a pass
//! over the sub-region completes the repository starts the next multipass,
//! until the configured pass budget is exhausted.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::film::SubRegion;
use crate::sampler::TileWork;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileRepositoryState {
    pending: Vec<TileWork>,
    multipass_index: u32,
}

struct QueueState {
    pending: Vec<TileWork>,
    multipass_index: u32,
}

pub struct TileRepository {
    sub_region: SubRegion,
    tile_size: u32,
    /// Maximum number of multipasses; 0 means unbounded.
    max_multipass: u32,
    queue: Mutex<QueueState>,
}

impl TileRepository {
    pub fn new(sub_region: SubRegion, tile_size: u32, max_multipass: u32) -> TileRepository {
        let repository = TileRepository {
            sub_region,
            tile_size: tile_size.max(8),
            max_multipass,
            queue: Mutex::new(QueueState {
                pending: Vec::new(),
                multipass_index: 0,
            }),
        };
        repository.queue.lock().pending = repository.tiles_for_pass(0);
        repository
    }

    fn tiles_for_pass(&self, multipass_index: u32) -> Vec<TileWork> {
        let mut tiles = Vec::new();
        let mut y = self.sub_region.y_min;
        let mut pass_index = 0;
        while y <= self.sub_region.y_max {
            let height = self.tile_size.min(self.sub_region.y_max - y + 1);
            let mut x = self.sub_region.x_min;
            while x <= self.sub_region.x_max {
                let width = self.tile_size.min(self.sub_region.x_max - x + 1);
                tiles.push(TileWork {
                    x,
                    y,
                    width,
                    height,
                    pass_index,
                    multipass_index,
                });
                pass_index += 1;
                x += self.tile_size;
            }
            y += self.tile_size;
        }
        // Hand tiles out from the front of the image.
        tiles.reverse();
        tiles
    }

    /// Claim the next tile; `None` once the pass budget is spent.
    pub fn next_tile(&self) -> Option<TileWork> {
        let mut queue = self.queue.lock();
        if queue.pending.is_empty() {
            let next_pass = queue.multipass_index + 1;
            if self.max_multipass > 0 && next_pass >= self.max_multipass {
                return None;
            }
            queue.multipass_index = next_pass;
            queue.pending = self.tiles_for_pass(next_pass);
        }
        queue.pending.pop()
    }

    pub fn multipass_index(&self) -> u32 {
        self.queue.lock().multipass_index
    }

    /// Snapshot for the render-state blob.
    pub fn snapshot(&self) -> TileRepositoryState {
        let queue = self.queue.lock();
        TileRepositoryState {
            pending: queue.pending.clone(),
            multipass_index: queue.multipass_index,
        }
    }

    pub fn restore(&self, state: TileRepositoryState) {
        let mut queue = self.queue.lock();
        queue.pending = state.pending;
        queue.multipass_index = state.multipass_index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiles_cover_region_once_per_pass() {
        let repo = TileRepository::new(
            SubRegion {
                x_min: 0,
                x_max: 31,
                y_min: 0,
                y_max: 31,
            },
            16,
            1,
        );
        let mut covered = 0;
        while let Some(tile) = repo.next_tile() {
            assert_eq!(tile.multipass_index, 0);
            covered += tile.width * tile.height;
        }
        assert_eq!(covered, 32 * 32);
    }

    #[test]
    fn test_multipass_rollover() {
        let repo = TileRepository::new(
            SubRegion {
                x_min: 0,
                x_max: 15,
                y_min: 0,
                y_max: 15,
            },
            16,
            3,
        );
        let mut tiles = Vec::new();
        while let Some(tile) = repo.next_tile() {
            tiles.push(tile);
        }
        assert_eq!(tiles.len(), 3);
        assert_eq!(tiles[2].multipass_index, 2);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let region = SubRegion {
            x_min: 0,
            x_max: 31,
            y_min: 0,
            y_max: 31,
        };
        let repo = TileRepository::new(region, 16, 4);
        repo.next_tile();
        repo.next_tile();
        let snapshot = repo.snapshot();

        let restored = TileRepository::new(region, 16, 4);
        restored.restore(snapshot.clone());
        // The restored queue resumes exactly where the snapshot was taken.
        assert_eq!(restored.snapshot().pending, snapshot.pending);
        assert_eq!(restored.multipass_index(), repo.multipass_index());
    }

    #[test]
    fn test_ragged_edges() {
        let repo = TileRepository::new(
            SubRegion {
                x_min: 0,
                x_max: 19,
                y_min: 0,
                y_max: 9,
            },
            16,
            1,
        );
        let mut covered = 0;
        while let Some(tile) = repo.next_tile() {
            covered += tile.width * tile.height;
        }
        assert_eq!(covered, 20 * 10);
    }
}
