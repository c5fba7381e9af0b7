/// One company/profile page to turn into questions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub company: String,
    pub profile: String,
    pub url: String,
}

impl Target {
    pub fn new(company: &str, profile: &str, url: &str) -> Self {
        Target {
            company: company.to_string(),
            profile: profile.to_string(),
            url: url.to_string(),
        }
    }
}

const DEFAULT_TARGETS: &[(&str, &str, &str)] = &[
    (
        "Meta",
        "Frontend Engineer",
        "https://www.geeksforgeeks.org/meta-interview-questions/",
    ),
    (
        "Amazon",
        "SDE / Data Analyst",
        "https://www.simplilearn.com/tutorials/data-analytics-tutorial/amazon-data-analyst-interview-questions",
    ),
    (
        "Apple",
        "Software Engineer",
        "https://www.geeksforgeeks.org/apple-interview-questions/",
    ),
    (
        "Netflix",
        "Senior Software Engineer",
        "https://www.simplilearn.com/netflix-interview-questions-article",
    ),
    (
        "Google",
        "SDE Intern",
        "https://www.geeksforgeeks.org/top-25-interview-questions-for-google-sde-internship/",
    ),
];

pub fn default_targets() -> Vec<Target> {
    DEFAULT_TARGETS
        .iter()
        .map(|(company, profile, url)| Target::new(company, profile, url))
        .collect()
}

/// Keep only targets whose company matches `company` (case-insensitive), in order.
pub fn filter_by_company(targets: Vec<Target>, company: Option<&str>) -> Vec<Target> {
    match company {
        Some(name) => targets
            .into_iter()
            .filter(|t| t.company.eq_ignore_ascii_case(name.trim()))
            .collect(),
        None => targets,
    }
}
