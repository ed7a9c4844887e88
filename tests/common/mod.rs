//! Shared fixtures for integration tests

#![allow(dead_code)]

use inspection_risk::config::ModelConfig;
use inspection_risk::models::{InspectionEvent, RestaurantRecord};

pub const CUISINES: [&str; 4] = ["American", "Chinese", "Italian", "Pizza"];
pub const BOROUGHS: [&str; 3] = ["Brooklyn", "Manhattan", "Queens"];

/// Small forests keep the suite fast
pub fn test_config() -> ModelConfig {
    ModelConfig {
        n_trees: 20,
        ..Default::default()
    }
}

/// Grade a score the way the inspection agency does
pub fn grade_for(score: f64) -> &'static str {
    if score <= 13.0 {
        "A"
    } else if score <= 27.0 {
        "B"
    } else {
        "C"
    }
}

/// Build a record from most-recent-first scores
pub fn restaurant(id: &str, cuisine: &str, borough: &str, scores: &[f64]) -> RestaurantRecord {
    let events = scores
        .iter()
        .map(|&score| InspectionEvent::new(score, grade_for(score)))
        .collect();
    RestaurantRecord::new(id, format!("Restaurant {id}"), cuisine, borough).with_events(events)
}

/// Deterministic batch spanning every risk band, cuisine and borough
pub fn sample_restaurants(n: usize) -> Vec<RestaurantRecord> {
    (0..n)
        .map(|i| {
            let base = (i * 11 % 45) as f64;
            let history = [base, base + 3.0, (base - 2.0).max(0.0), base + 1.0];
            restaurant(
                &format!("rest-{i:03}"),
                CUISINES[i % CUISINES.len()],
                BOROUGHS[i % BOROUGHS.len()],
                &history[..(i % 4) + 1],
            )
        })
        .collect()
}
