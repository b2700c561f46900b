// Flight search

use chrono::{Local, NaiveDate};
use tracing::debug;

use crate::config::TapiConfig;
use crate::session::SearchQuery;
use crate::utils::{coerce_date, params, Param, Params};
use crate::validations::{RuleSet, Validate, ValidationErrors};

const COMFORT_CODES: [&str; 4] = ["E", "B", "EB", "BE"];

fn is_airport_code(code: &str) -> bool {
    code.len() == 3
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// Unparsable dates are logged and leave the field unset
fn lenient_date(field: &str, value: &Param) -> Option<NaiveDate> {
    match coerce_date(value) {
        Ok(date) => date,
        Err(err) => {
            debug!(field, error = %err, "Ignoring flight date");
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlightSearch {
    origin: Option<String>,
    destination: Option<String>,
    leaves_on: Option<NaiveDate>,
    returns_on: Option<NaiveDate>,
    one_way: bool,
    adults: i64,
    children: i64,
    infants: i64,
    comfort: String,
    errors: ValidationErrors,
}

impl FlightSearch {
    pub fn new(options: &Params) -> Self {
        let option = |key: &str| options.get(key).cloned().unwrap_or(Param::Null);
        let or_default = |key: &str, default: i64| match options.get(key) {
            Some(value) if !value.is_null() => value.clone(),
            _ => Param::Integer(default),
        };

        let mut search = Self {
            origin: None,
            destination: None,
            leaves_on: None,
            returns_on: None,
            one_way: false,
            adults: 1,
            children: 0,
            infants: 0,
            comfort: "E".to_string(),
            errors: ValidationErrors::new(),
        };
        search.set_origin(option("origin"));
        search.set_destination(option("destination"));
        search.set_leaves_on(option("leaves_on"));
        search.set_returns_on(option("returns_on"));
        search.set_one_way(option("one_way"));
        search.set_adults(or_default("adults", 1));
        search.set_children(or_default("children", 0));
        search.set_infants(or_default("infants", 0));
        match option("comfort") {
            Param::Null => search.set_comfort("E"),
            comfort => search.set_comfort(&comfort.to_string()),
        }
        search
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn set_origin(&mut self, value: impl Into<Param>) {
        self.origin = value.into().to_text();
    }

    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    pub fn set_destination(&mut self, value: impl Into<Param>) {
        self.destination = value.into().to_text();
    }

    pub fn leaves_on(&self) -> Option<NaiveDate> {
        self.leaves_on
    }

    pub fn set_leaves_on(&mut self, value: impl Into<Param>) {
        self.leaves_on = lenient_date("leaves_on", &value.into());
    }

    pub fn returns_on(&self) -> Option<NaiveDate> {
        self.returns_on
    }

    pub fn set_returns_on(&mut self, value: impl Into<Param>) {
        self.returns_on = lenient_date("returns_on", &value.into());
    }

    pub fn one_way(&self) -> bool {
        self.one_way
    }

    pub fn set_one_way(&mut self, value: impl Into<Param>) {
        self.one_way = value.into().to_string() == "true";
    }

    pub fn adults(&self) -> i64 {
        self.adults
    }

    pub fn set_adults(&mut self, value: impl Into<Param>) {
        self.adults = value.into().to_integer_lossy();
    }

    pub fn children(&self) -> i64 {
        self.children
    }

    pub fn set_children(&mut self, value: impl Into<Param>) {
        self.children = value.into().to_integer_lossy();
    }

    pub fn infants(&self) -> i64 {
        self.infants
    }

    pub fn set_infants(&mut self, value: impl Into<Param>) {
        self.infants = value.into().to_integer_lossy();
    }

    pub fn comfort(&self) -> &str {
        &self.comfort
    }

    pub fn set_comfort(&mut self, comfort: &str) {
        self.comfort = comfort.to_uppercase();
    }
}

fn check_flight(search: &FlightSearch, errors: &mut ValidationErrors) {
    let today = Local::now().date_naive();

    if let Some(leaves_on) = search.leaves_on {
        if leaves_on < today {
            errors.add("leaves_on", "Departure must be in the future.");
        }
    }

    if let (Some(returns_on), Some(leaves_on)) = (search.returns_on, search.leaves_on) {
        if returns_on < leaves_on {
            errors.add("returns_on", "The return flight must be later than the departure.");
        }
    }

    if search.leaves_on.is_none() {
        errors.add("leaves_on", "Please choose a valid departure date.");
    }

    if search.one_way && search.returns_on.is_some() {
        errors.add("returns_on", "Please choose either one-way or a return date.");
    }

    if !search.one_way && search.returns_on.is_none() {
        errors.add("returns_on", "Please choose a valid date.");
    }

    if search.adults < search.infants {
        errors.add(
            "passengers",
            "The number of adults must be at least the number of infants.",
        );
    }

    if search.adults < 1 {
        errors.add("passengers", "At least one adult has to fly.");
    }

    if !is_airport_code(search.origin().unwrap_or_default()) {
        errors.add("origin", "Please choose a departure airport.");
    }

    if !is_airport_code(search.destination().unwrap_or_default()) {
        errors.add("destination", "Please choose a destination airport.");
    }

    if !COMFORT_CODES.contains(&search.comfort.as_str()) {
        errors.add("passengers", "Please provide a valid comfort code.");
    }

    if let (Some(origin), Some(destination)) = (search.origin(), search.destination()) {
        if origin == destination {
            errors.add(
                "destination",
                "Please choose different departure and destination airports.",
            );
        }
    }
}

impl Validate for FlightSearch {
    fn rules() -> RuleSet<Self> {
        RuleSet::new()
            .numericality_of(
                "adults",
                |search: &FlightSearch| Param::Integer(search.adults),
                "Please choose the number of adults.",
            )
            .numericality_of(
                "children",
                |search: &FlightSearch| Param::Integer(search.children),
                "Please choose the number of children.",
            )
            .numericality_of(
                "infants",
                |search: &FlightSearch| Param::Integer(search.infants),
                "Please choose the number of infants.",
            )
            .validate("flight", check_flight)
    }

    fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    fn errors_mut(&mut self) -> &mut ValidationErrors {
        &mut self.errors
    }
}

impl SearchQuery for FlightSearch {
    const NAME: &'static str = "FlightSearch";

    fn item_path(&self) -> &'static str {
        "flights"
    }

    fn parameters(&self, config: &TapiConfig) -> Params {
        params([
            ("key", Param::from(config.key.clone())),
            ("format", Param::from("json")),
            ("origin", Param::from(self.origin.clone())),
            ("destination", Param::from(self.destination.clone())),
            ("leaves_on", Param::from(self.leaves_on)),
            ("returns_on", Param::from(self.returns_on)),
            ("one_way", Param::from(self.one_way)),
            ("adults", Param::from(self.adults)),
            ("children", Param::from(self.children)),
            ("infants", Param::from(self.infants)),
            ("comfort", Param::from(self.comfort.clone())),
        ])
    }
}
