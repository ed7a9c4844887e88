use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Grades counted as a poor inspection outcome
pub const BAD_GRADES: [&str; 3] = ["B", "C", "Z"];

/// Category used when a record carries no cuisine or borough
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// One historical sanitary inspection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct InspectionEvent {
    /// Inspection score (higher is worse)
    #[validate(custom(function = "validate_finite"))]
    pub score: f64,

    /// Letter grade (A, B, C, Z, P, ...)
    pub grade: String,

    /// Inspection date, when the source provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

impl InspectionEvent {
    pub fn new(score: f64, grade: impl Into<String>) -> Self {
        Self {
            score,
            grade: grade.into(),
            date: None,
        }
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Check if the grade belongs to the bad set
    pub fn is_bad_grade(&self) -> bool {
        BAD_GRADES.contains(&self.grade.as_str())
    }
}

/// A restaurant and its inspection history, most recent event first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RestaurantRecord {
    /// Restaurant identifier
    #[serde(alias = "restaurant_id")]
    #[validate(length(min = 1, max = 255))]
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Cuisine category
    #[serde(default = "unknown_category")]
    pub cuisine: String,

    /// Borough category
    #[serde(default = "unknown_category")]
    pub borough: String,

    /// Inspection events, index 0 is the most recent
    #[serde(default, alias = "grades")]
    #[validate(nested)]
    pub events: Vec<InspectionEvent>,
}

impl RestaurantRecord {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        cuisine: impl Into<String>,
        borough: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            cuisine: cuisine.into(),
            borough: borough.into(),
            events: Vec::new(),
        }
    }

    pub fn with_events(mut self, events: Vec<InspectionEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn with_event(mut self, score: f64, grade: &str) -> Self {
        self.events.push(InspectionEvent::new(score, grade));
        self
    }

    /// Check if at least one inspection is recorded
    pub fn has_history(&self) -> bool {
        !self.events.is_empty()
    }

    /// Most recent inspection score
    pub fn latest_score(&self) -> Option<f64> {
        self.events.first().map(|e| e.score)
    }

    /// Check the most-recent-first ordering where every event is dated.
    ///
    /// Histories with missing dates cannot be checked and are trusted as given.
    pub fn is_chronologically_ordered(&self) -> bool {
        let dates: Option<Vec<DateTime<Utc>>> = self.events.iter().map(|e| e.date).collect();
        match dates {
            Some(dates) => dates.windows(2).all(|pair| pair[0] >= pair[1]),
            None => true,
        }
    }
}

fn unknown_category() -> String {
    UNKNOWN_CATEGORY.to_string()
}

fn validate_finite(score: f64) -> Result<(), ValidationError> {
    if score.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::new("non_finite_score"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_bad_grades() {
        assert!(InspectionEvent::new(20.0, "B").is_bad_grade());
        assert!(InspectionEvent::new(30.0, "C").is_bad_grade());
        assert!(InspectionEvent::new(30.0, "Z").is_bad_grade());
        assert!(!InspectionEvent::new(5.0, "A").is_bad_grade());
        assert!(!InspectionEvent::new(5.0, "P").is_bad_grade());
    }

    #[test]
    fn test_deserialize_source_document() {
        let json = r#"{
            "restaurant_id": "30075445",
            "name": "Morris Park Bake Shop",
            "cuisine": "Bakery",
            "borough": "Bronx",
            "grades": [
                {"score": 2, "grade": "A", "date": "2014-03-03T00:00:00Z"},
                {"score": 6, "grade": "A", "date": "2013-09-11T00:00:00Z"}
            ]
        }"#;

        let record: RestaurantRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, "30075445");
        assert_eq!(record.events.len(), 2);
        assert_eq!(record.latest_score(), Some(2.0));
        assert!(record.is_chronologically_ordered());
    }

    #[test]
    fn test_missing_categories_default_to_unknown() {
        let record: RestaurantRecord = serde_json::from_str(r#"{"id": "r1"}"#).unwrap();
        assert_eq!(record.cuisine, UNKNOWN_CATEGORY);
        assert_eq!(record.borough, UNKNOWN_CATEGORY);
        assert!(!record.has_history());
    }

    #[test]
    fn test_unsorted_dates_detected() {
        let older = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();

        let record = RestaurantRecord::new("r1", "Diner", "American", "Queens").with_events(vec![
            InspectionEvent::new(10.0, "A").with_date(older),
            InspectionEvent::new(12.0, "A").with_date(newer),
        ]);
        assert!(!record.is_chronologically_ordered());

        let partially_dated = RestaurantRecord::new("r2", "Diner", "American", "Queens")
            .with_events(vec![
                InspectionEvent::new(10.0, "A").with_date(older),
                InspectionEvent::new(12.0, "A"),
            ]);
        assert!(partially_dated.is_chronologically_ordered());
    }

    #[test]
    fn test_validation() {
        let record = RestaurantRecord::new("", "Diner", "American", "Queens");
        assert!(record.validate().is_err());

        let record = RestaurantRecord::new("r1", "Diner", "American", "Queens")
            .with_event(f64::NAN, "A");
        assert!(record.validate().is_err());

        let record = RestaurantRecord::new("r1", "Diner", "American", "Queens")
            .with_event(12.0, "A");
        assert!(record.validate().is_ok());
    }
}
