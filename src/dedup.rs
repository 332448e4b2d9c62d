//! Picking one record per site.
//!
//! The `cells` table repeats site columns on every cell row and they do not
//! always agree, so the same `site_id` can come back more than once with a
//! different location or site type. The record that looks most complete wins.

use std::collections::HashMap;

use tracing::debug;

use crate::model::{SiteType, Tower};

const POINTS_PER_SECTOR: u32 = 5;
const POINTS_FOR_COORDINATES: u32 = 5;
const POINTS_PER_REGION_FIELD: u32 = 2;

pub fn score(tower: &Tower) -> u32 {
    let mut score = tower.sectors().len() as u32 * POINTS_PER_SECTOR;
    score += tower.kind().map_or(0, SiteType::score);

    let location = &tower.location;
    if location.is_plottable() {
        score += POINTS_FOR_COORDINATES;
    }
    for field in [
        &location.kelurahan,
        &location.kecamatan,
        &location.kabupaten,
    ] {
        if !field.is_empty() {
            score += POINTS_PER_REGION_FIELD;
        }
    }

    score
}

/// Keeps the highest scoring record per site id. Ties go to the record seen
/// first, and ids keep the order in which they first appeared.
pub fn dedup(towers: Vec<Tower>) -> Vec<Tower> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut best: Vec<(Tower, u32, usize)> = Vec::with_capacity(towers.len());

    for tower in towers {
        let score = score(&tower);
        match index.get(&tower.site_id) {
            Some(&i) => {
                let (current, current_score, instances) = &mut best[i];
                *instances += 1;
                if score > *current_score {
                    debug!(
                        site_id = %tower.site_id,
                        score,
                        sectors = tower.sectors().len(),
                        site_type = %tower.site_type,
                        "selected better instance of tower"
                    );
                    *current = tower;
                    *current_score = score;
                }
            }
            None => {
                index.insert(tower.site_id.clone(), best.len());
                best.push((tower, score, 1));
            }
        }
    }

    best.into_iter()
        .map(|(tower, _, instances)| {
            if instances > 1 {
                debug!(site_id = %tower.site_id, instances, "found duplicate tower");
            }
            tower
        })
        .collect()
}
