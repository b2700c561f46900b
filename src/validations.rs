// Declarative validation rules
// A rule set is an ordered list of named checks; composing a set on top of a
// base keeps the base checks first

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::utils::{coerce_date, Param};

// field -> messages, in the order the rules produced them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0
            .iter()
            .map(|(field, messages)| (field.as_str(), messages.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, messages)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", field, messages.join(", "))?;
        }
        Ok(())
    }
}

type Check<T> = Box<dyn Fn(&T, &mut ValidationErrors) + Send + Sync>;

pub struct Rule<T> {
    name: String,
    check: Check<T>,
}

impl<T> Rule<T> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub struct RuleSet<T> {
    rules: Vec<Rule<T>>,
}

impl<T> Default for RuleSet<T> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<T: 'static> RuleSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    // Builds on a base set; rules added afterwards run after the base rules
    pub fn extending(base: RuleSet<T>) -> Self {
        base
    }

    pub fn validate<F>(mut self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&T, &mut ValidationErrors) + Send + Sync + 'static,
    {
        self.rules.push(Rule {
            name: name.into(),
            check: Box::new(check),
        });
        self
    }

    pub fn presence_of<A>(self, field: &str, accessor: A, message: &str) -> Self
    where
        A: Fn(&T) -> Param + Send + Sync + 'static,
    {
        let (field, message) = (field.to_string(), message.to_string());
        self.validate(format!("presence_of:{}", field), move |target, errors| {
            if accessor(target).is_blank() {
                errors.add(field.as_str(), message.as_str());
            }
        })
    }

    pub fn numericality_of<A>(self, field: &str, accessor: A, message: &str) -> Self
    where
        A: Fn(&T) -> Param + Send + Sync + 'static,
    {
        let (field, message) = (field.to_string(), message.to_string());
        self.validate(format!("numericality_of:{}", field), move |target, errors| {
            if !is_numeric(&accessor(target)) {
                errors.add(field.as_str(), message.as_str());
            }
        })
    }

    pub fn date_format_of<A>(self, field: &str, accessor: A, message: &str) -> Self
    where
        A: Fn(&T) -> Param + Send + Sync + 'static,
    {
        let (field, message) = (field.to_string(), message.to_string());
        self.validate(format!("date_format_of:{}", field), move |target, errors| {
            if coerce_date(&accessor(target)).is_err() {
                errors.add(field.as_str(), message.as_str());
            }
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(Rule::name).collect()
    }

    // Runs every rule in order into a fresh error map
    pub fn evaluate(&self, target: &T) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        for rule in &self.rules {
            (rule.check)(target, &mut errors);
        }
        errors
    }
}

// Whole numbers or all-digit text
fn is_numeric(value: &Param) -> bool {
    match value {
        Param::Integer(_) => true,
        Param::Text(text) => !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()),
        _ => false,
    }
}

pub trait Validate: Sized + 'static {
    fn rules() -> RuleSet<Self>;

    fn errors(&self) -> &ValidationErrors;

    fn errors_mut(&mut self) -> &mut ValidationErrors;

    fn add_error(&mut self, field: &str, message: &str) {
        self.errors_mut().add(field, message);
    }

    fn has_errors(&self) -> bool {
        !self.errors().is_empty()
    }

    // Recomputes the error map from scratch on every call
    fn is_valid(&mut self) -> bool {
        let rules = Self::rules();
        let errors = rules.evaluate(self);
        debug!(rules = ?rules.names(), errors = %errors, "Validated");
        *self.errors_mut() = errors;
        self.errors().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    struct Booking {
        name: Option<String>,
        nights: Param,
        arrival: Param,
        errors: ValidationErrors,
    }

    fn base_rules() -> RuleSet<Booking> {
        RuleSet::new()
            .presence_of("name", |b: &Booking| b.name.clone().into(), "name missing")
            .validate("base_nights", |b, errors| {
                if b.nights == Param::Integer(0) {
                    errors.add("nights", "base: zero nights");
                }
            })
    }

    impl Validate for Booking {
        fn rules() -> RuleSet<Self> {
            RuleSet::extending(base_rules())
                .numericality_of("nights", |b: &Booking| b.nights.clone(), "nights not a number")
                .date_format_of("arrival", |b: &Booking| b.arrival.clone(), "bad arrival")
                .validate("own_nights", |b, errors| {
                    if b.nights == Param::Integer(0) {
                        errors.add("nights", "own: zero nights");
                    }
                })
        }

        fn errors(&self) -> &ValidationErrors {
            &self.errors
        }

        fn errors_mut(&mut self) -> &mut ValidationErrors {
            &mut self.errors
        }
    }

    fn booking() -> Booking {
        Booking {
            name: Some("Ada".to_string()),
            nights: Param::Integer(2),
            arrival: Param::from("01.01.2099"),
            errors: ValidationErrors::new(),
        }
    }

    #[test]
    fn test_valid_booking() {
        let mut booking = booking();
        assert!(booking.is_valid());
        assert!(!booking.has_errors());
    }

    #[test]
    fn test_base_rules_run_first() {
        let names = Booking::rules().names().join(",");
        assert_eq!(
            names,
            "presence_of:name,base_nights,numericality_of:nights,date_format_of:arrival,own_nights"
        );

        let mut booking = Booking {
            nights: Param::Integer(0),
            ..booking()
        };
        assert!(!booking.is_valid());
        assert_eq!(
            booking.errors().get("nights"),
            ["base: zero nights".to_string(), "own: zero nights".to_string()]
        );
    }

    #[test]
    fn test_base_failure_visible_in_extended_set() {
        let mut booking = Booking {
            name: None,
            ..booking()
        };
        assert!(!booking.is_valid());
        assert_eq!(booking.errors().get("name"), ["name missing".to_string()]);
    }

    #[test]
    fn test_errors_are_recomputed() {
        let mut booking = Booking {
            name: None,
            ..booking()
        };
        assert!(!booking.is_valid());
        assert!(!booking.is_valid());
        assert_eq!(booking.errors().get("name").len(), 1);

        booking.name = Some("Grace".to_string());
        assert!(booking.is_valid());
        assert!(booking.errors().is_empty());
    }

    #[test_case(Param::Integer(3), true; "integer")]
    #[test_case(Param::from("12"), true; "digit text")]
    #[test_case(Param::from("1.5"), false; "decimal text")]
    #[test_case(Param::from(""), false; "empty text")]
    #[test_case(Param::Null, false; "nothing")]
    fn test_numericality(nights: Param, valid: bool) {
        let mut booking = Booking { nights, ..booking() };
        booking.is_valid();
        assert_eq!(!booking.errors().contains("nights"), valid);
    }

    #[test_case(Param::from("2099-01-01"), true; "iso")]
    #[test_case(Param::Null, true; "nothing")]
    #[test_case(Param::from("schnabu"), false; "garbage")]
    #[test_case(Param::Integer(5), false; "number")]
    fn test_date_format(arrival: Param, valid: bool) {
        let mut booking = Booking { arrival, ..booking() };
        booking.is_valid();
        assert_eq!(!booking.errors().contains("arrival"), valid);
    }

    #[test]
    fn test_error_display() {
        let mut errors = ValidationErrors::new();
        errors.add("b", "two");
        errors.add("a", "one");
        errors.add("a", "again");
        assert_eq!(errors.to_string(), "a: one, again; b: two");
        assert_eq!(errors.len(), 2);
        assert_eq!(
            errors.iter().map(|(field, _)| field).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }
}
