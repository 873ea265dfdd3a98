//! Keyword classification of alert titles
//!
//! Severity and safety tips are deterministic functions of the lowercased
//! title. Rules are ordered tables checked first-match-wins; no state, safe
//! from any thread.

use super::model::Severity;

const EXTREME_KEYWORDS: &[&str] = &["extreme", "severe", "hurricane", "tornado"];
const WARNING_KEYWORDS: &[&str] = &["warning", "storm", "flood"];
const WATCH_KEYWORDS: &[&str] = &["watch", "advisory"];

/// Classify severity from the title, priority order extreme > warning > watch.
pub fn classify_severity(title: &str) -> Severity {
    let lower = title.to_lowercase();
    let matches = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

    if matches(EXTREME_KEYWORDS) {
        Severity::Extreme
    } else if matches(WARNING_KEYWORDS) {
        Severity::Warning
    } else if matches(WATCH_KEYWORDS) {
        Severity::Watch
    } else {
        Severity::Information
    }
}

/// Tip categories, checked in order; first matching keyword set wins.
const TIP_RULES: &[(&[&str], &[&str])] = &[
    (
        &["flood"],
        &[
            "Move to higher ground immediately",
            "Do not walk, swim, or drive through flood waters",
            "Stay off bridges over fast-moving water",
            "Evacuate if told to do so",
        ],
    ),
    (
        &["tornado"],
        &[
            "Go to a basement or an interior room on the lowest floor",
            "Stay away from windows, doors, and outside walls",
            "Do not try to outrun a tornado in a vehicle",
            "Cover your head and neck with your arms",
        ],
    ),
    (
        &["hurricane"],
        &[
            "Evacuate if advised by authorities",
            "Secure your home and outdoor items",
            "Have emergency supplies ready",
            "Stay indoors during the hurricane",
        ],
    ),
    (
        &["thunderstorm"],
        &[
            "When thunder roars, go indoors",
            "Stay away from windows and electrical equipment",
            "Avoid using plumbing fixtures",
            "Do not shelter under trees",
        ],
    ),
    (
        &["heat"],
        &[
            "Stay in air-conditioned areas when possible",
            "Drink plenty of fluids",
            "Wear lightweight, light-colored clothing",
            "Limit outdoor activities during the hottest part of the day",
        ],
    ),
    (
        &["winter", "snow", "ice"],
        &[
            "Stay indoors during the storm",
            "Walk carefully on snowy or icy walkways",
            "Keep dry and change wet clothing frequently",
            "Avoid travel if possible",
        ],
    ),
];

const GENERAL_TIPS: &[&str] = &[
    "Stay informed through local news or weather app",
    "Have an emergency kit ready",
    "Follow instructions from local authorities",
    "Check on vulnerable family members and neighbors",
];

/// Static safety-tip list for an alert title.
pub fn safety_tips(title: &str) -> Vec<String> {
    let lower = title.to_lowercase();
    for (keywords, tips) in TIP_RULES {
        if keywords.iter().any(|k| lower.contains(k)) {
            return tips.iter().map(|t| t.to_string()).collect();
        }
    }
    GENERAL_TIPS.iter().map(|t| t.to_string()).collect()
}
