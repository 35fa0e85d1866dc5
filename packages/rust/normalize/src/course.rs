//! Course code decomposition.
//!
//! A course string such as `CIS210` splits into a department prefix (the
//! maximal leading run of letters) and a course number (the first run of
//! digits after the prefix).
//!
//! Edge cases, applied in this order:
//! - no leading letters and no digits at all (`""`, `"--"`): the whole trimmed
//!   string becomes the prefix and the number is `None`;
//! - no leading letters but digits present (`"101"`): the prefix is empty;
//! - letters but no digits (`"CIS"`, `"CIS-H"`): the number is `None` and the
//!   prefix is still only the leading letter run.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use gradesync_shared::Department;
use regex::Regex;

/// Leading run of letters.
static PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\p{Alphabetic}+").expect("prefix regex"));

/// First run of ASCII digits.
static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]+").expect("number regex"));

/// A decomposed course code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CourseCode {
    /// Department prefix, e.g. `CIS`.
    pub department_prefix: String,
    /// Course number, e.g. `210`.
    pub number: Option<String>,
}

impl CourseCode {
    /// Decompose a raw course string.
    pub fn parse(course: &str) -> Self {
        let course = course.trim();
        let prefix = PREFIX_RE.find(course).map(|m| m.as_str()).unwrap_or("");
        let rest = &course[prefix.len()..];
        let number = NUMBER_RE.find(rest).map(|m| m.as_str().to_string());

        let department_prefix = if prefix.is_empty() && number.is_none() {
            course.to_string()
        } else {
            prefix.to_string()
        };

        Self {
            department_prefix,
            number,
        }
    }

    /// Whether this code belongs to `department` (exact prefix equality).
    pub fn is_in(&self, department: &str) -> bool {
        self.department_prefix == department
    }
}

impl fmt::Display for CourseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.department_prefix, self.number.as_deref().unwrap_or(""))
    }
}

/// Split a course string into `(prefix, number)`.
pub fn extract_department_and_number(course: &str) -> (String, Option<String>) {
    let code = CourseCode::parse(course);
    (code.department_prefix, code.number)
}

/// Department names and course numbers present in `courses`, restricted to
/// the known department set. Both lists are sorted and deduplicated.
pub fn known_departments_and_classes<'a>(
    courses: impl IntoIterator<Item = &'a str>,
    known: &[Department],
) -> (Vec<String>, Vec<String>) {
    let mut departments = BTreeSet::new();
    let mut classes = BTreeSet::new();

    for course in courses {
        let code = CourseCode::parse(course);
        let Some(dept) = known.iter().find(|d| code.is_in(&d.code)) else {
            continue;
        };
        departments.insert(dept.name.clone());
        if let Some(number) = code.number {
            classes.insert(number);
        }
    }

    (departments.into_iter().collect(), classes.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_prefix_and_number() {
        assert_eq!(
            extract_department_and_number("CIS210"),
            ("CIS".to_string(), Some("210".to_string()))
        );
        assert_eq!(
            extract_department_and_number("MATH251H"),
            ("MATH".to_string(), Some("251".to_string()))
        );
        assert_eq!(
            extract_department_and_number("BI 211"),
            ("BI".to_string(), Some("211".to_string()))
        );
    }

    #[test]
    fn prefix_plus_number_round_trips() {
        for (prefix, number) in [("CIS", "101"), ("AA", "5"), ("HPHY", "0412"), ("X", "9")] {
            let code = format!("{prefix}{number}");
            assert_eq!(
                extract_department_and_number(&code),
                (prefix.to_string(), Some(number.to_string())),
                "round trip failed for {code}"
            );
            assert_eq!(CourseCode::parse(&code).to_string(), code);
        }
    }

    #[test]
    fn letters_without_digits() {
        assert_eq!(extract_department_and_number("CIS"), ("CIS".to_string(), None));
        assert_eq!(extract_department_and_number("CIS-H"), ("CIS".to_string(), None));
    }

    #[test]
    fn digits_without_letters() {
        assert_eq!(
            extract_department_and_number("101"),
            (String::new(), Some("101".to_string()))
        );
    }

    #[test]
    fn no_letters_no_digits_keeps_whole_string() {
        assert_eq!(extract_department_and_number("--"), ("--".to_string(), None));
        assert_eq!(extract_department_and_number(""), (String::new(), None));
    }

    #[test]
    fn departments_and_classes_filter_known_set() {
        let known = vec![
            Department {
                code: "CIS".into(),
                slug: "computerandinfoscience".into(),
                name: "Computer and Information Science".into(),
            },
            Department {
                code: "MATH".into(),
                slug: "mathematics".into(),
                name: "Mathematics".into(),
            },
        ];
        let (departments, classes) = known_departments_and_classes(
            ["CIS210", "CIS211", "MATH251", "ART101", "CIS210"],
            &known,
        );
        assert_eq!(departments, vec!["Computer and Information Science", "Mathematics"]);
        assert_eq!(classes, vec!["210", "211", "251"]);
    }
}
