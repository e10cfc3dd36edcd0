//! Rule-based customer segments

use std::fmt;

use serde::Serialize;

/// Quartile scores of one customer, each in `1..=4`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Scores {
    #[serde(rename = "R")]
    pub r: u8,
    #[serde(rename = "F")]
    pub f: u8,
    #[serde(rename = "M")]
    pub m: u8,
}

impl Scores {
    pub fn new(r: u8, f: u8, m: u8) -> Self {
        Scores { r, f, m }
    }

    /// Composite label such as `"432"`
    pub fn rfm_score(&self) -> String {
        format!("{}{}{}", self.r, self.f, self.m)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Segment {
    #[serde(rename = "Champions")]
    Champions,
    #[serde(rename = "Loyal Customers")]
    LoyalCustomers,
    #[serde(rename = "Recent Customers")]
    RecentCustomers,
    #[serde(rename = "At Risk")]
    AtRisk,
    #[serde(rename = "Others")]
    Others,
}

impl Segment {
    pub const ALL: [Segment; 5] = [
        Segment::Champions,
        Segment::LoyalCustomers,
        Segment::RecentCustomers,
        Segment::AtRisk,
        Segment::Others,
    ];

    /// Classify a customer from their scores.
    ///
    /// Rules are checked top to bottom and the first match wins, so a
    /// customer scoring 3+ on all three metrics is a Champion even though
    /// they also satisfy the Loyal Customers rule.
    pub fn classify(scores: Scores) -> Segment {
        let Scores { r, f, m } = scores;
        if r >= 3 && f >= 3 && m >= 3 {
            Segment::Champions
        } else if r >= 2 && f >= 3 {
            Segment::LoyalCustomers
        } else if r >= 3 && f <= 2 {
            Segment::RecentCustomers
        } else if r == 1 && f >= 3 {
            Segment::AtRisk
        } else {
            Segment::Others
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Segment::Champions => "Champions",
            Segment::LoyalCustomers => "Loyal Customers",
            Segment::RecentCustomers => "Recent Customers",
            Segment::AtRisk => "At Risk",
            Segment::Others => "Others",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_precedence() {
        assert_eq!(Segment::classify(Scores::new(4, 4, 4)), Segment::Champions);
        assert_eq!(Segment::classify(Scores::new(3, 4, 4)), Segment::Champions);
        assert_eq!(Segment::classify(Scores::new(2, 4, 1)), Segment::LoyalCustomers);
        assert_eq!(Segment::classify(Scores::new(4, 3, 2)), Segment::LoyalCustomers);
        assert_eq!(Segment::classify(Scores::new(4, 1, 4)), Segment::RecentCustomers);
        assert_eq!(Segment::classify(Scores::new(1, 4, 1)), Segment::AtRisk);
        assert_eq!(Segment::classify(Scores::new(1, 1, 1)), Segment::Others);
        assert_eq!(Segment::classify(Scores::new(2, 2, 4)), Segment::Others);
    }

    #[test]
    fn test_every_score_combination_has_one_segment() {
        let mut counts: std::collections::HashMap<Segment, usize> = std::collections::HashMap::new();
        for r in 1..=4 {
            for f in 1..=4 {
                for m in 1..=4 {
                    *counts.entry(Segment::classify(Scores::new(r, f, m))).or_insert(0) += 1;
                }
            }
        }
        assert_eq!(counts.values().sum::<usize>(), 64);
        assert_eq!(counts[&Segment::Champions], 8);
        assert_eq!(counts[&Segment::LoyalCustomers], 16);
        assert_eq!(counts[&Segment::RecentCustomers], 16);
        assert_eq!(counts[&Segment::AtRisk], 8);
        assert_eq!(counts[&Segment::Others], 16);
    }

    #[test]
    fn test_rfm_score_and_labels() {
        assert_eq!(Scores::new(4, 3, 2).rfm_score(), "432");
        assert_eq!(Segment::AtRisk.to_string(), "At Risk");
        assert_eq!(
            serde_json::to_string(&Segment::LoyalCustomers).unwrap(),
            "\"Loyal Customers\""
        );
    }
}
