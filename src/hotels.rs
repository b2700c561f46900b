// Hotel search

use chrono::{Local, NaiveDate};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::config::TapiConfig;
use crate::document::{Document, Value};
use crate::errors::{Result, TapiError};
use crate::session::{SearchQuery, SearchSession};
use crate::utils::{coerce_date, params, Param, Params};
use crate::validations::{RuleSet, Validate, ValidationErrors};

const MAX_ROOMS: usize = 3;
const SINGLE_ROOM: &str = "[A]";
const DOUBLE_ROOM: &str = "[A|A]";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Room {
    pub adults: u32,
    // child number -> age
    pub children: BTreeMap<u32, u32>,
}

// Parses the compact `[A|2][A|A]` notation into rooms numbered from 1
pub fn parse_room_configuration(config: &str) -> Result<BTreeMap<usize, Room>> {
    let invalid =
        || TapiError::InvalidArgument(format!("{} is not a valid room configuration", config));

    if config.trim().is_empty() {
        return Err(invalid());
    }

    let rooms: Vec<String> = config
        .split("][")
        .map(|room| room.replace(|c: char| c == '[' || c == ']', ""))
        .collect();
    if rooms.len() > MAX_ROOMS {
        return Err(invalid());
    }

    let mut collection = BTreeMap::new();
    for (i, guests) in rooms.iter().enumerate() {
        let mut room = Room::default();
        // Trailing separators add no guest
        let mut tokens: Vec<&str> = guests.split('|').collect();
        while tokens.last() == Some(&"") {
            tokens.pop();
        }

        for guest in tokens {
            if guest == "A" {
                room.adults += 1;
            } else if !guest.is_empty() && guest.bytes().all(|b| b.is_ascii_digit()) {
                let age = guest.parse::<u32>().map_err(|_| invalid())?;
                // Numbered after the lowest existing key
                let key = room.children.keys().min().copied().unwrap_or(0) + 1;
                room.children.insert(key, age);
            } else {
                return Err(invalid());
            }
        }
        collection.insert(i + 1, room);
    }
    Ok(collection)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationType {
    City,
    Region,
    Hotel,
}

impl LocationType {
    pub fn name(&self) -> &'static str {
        match self {
            LocationType::City => "city",
            LocationType::Region => "region",
            LocationType::Hotel => "hotel",
        }
    }

    fn collection(&self) -> &'static str {
        match self {
            LocationType::City => "cities",
            LocationType::Region => "regions",
            LocationType::Hotel => "hotels",
        }
    }
}

impl fmt::Display for LocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn lenient_date(field: &str, value: &Param) -> Option<NaiveDate> {
    match coerce_date(value) {
        Ok(date) => date,
        Err(err) => {
            debug!(field, error = %err, "Ignoring hotel date");
            None
        }
    }
}

// Counts past the room limit can never form a valid search
fn room_count(value: Param) -> Result<i64> {
    let count = value.to_integer()?;
    if !(0..=MAX_ROOMS as i64).contains(&count) {
        return Err(TapiError::InvalidArgument(format!(
            "{} is not a valid room count",
            count
        )));
    }
    Ok(count)
}

// Blank ids are ignored
fn location_id_from(value: &Param) -> Option<i64> {
    value.to_text().map(|_| value.to_integer_lossy())
}

#[derive(Debug, Clone)]
pub struct HotelSearch {
    arrival_date: Option<NaiveDate>,
    departure_date: Option<NaiveDate>,
    city_id: Option<i64>,
    region_id: Option<i64>,
    hotel_id: Option<i64>,
    room_configuration: String,
    single_rooms_count: i64,
    double_rooms_count: i64,
    location: Option<Document>,
    errors: ValidationErrors,
}

impl Default for HotelSearch {
    fn default() -> Self {
        Self {
            arrival_date: None,
            departure_date: None,
            city_id: None,
            region_id: None,
            hotel_id: None,
            room_configuration: SINGLE_ROOM.to_string(),
            single_rooms_count: 1,
            double_rooms_count: 0,
            location: None,
            errors: ValidationErrors::new(),
        }
    }
}

impl HotelSearch {
    pub fn new(options: &Params) -> Result<Self> {
        let option = |key: &str| options.get(key).cloned().unwrap_or(Param::Null);

        let mut search = Self::default();
        search.set_arrival_date(option("arrival_date"));
        search.set_departure_date(option("departure_date"));
        search.set_city_id(option("city_id"));
        search.set_region_id(option("region_id"));
        search.set_hotel_id(option("hotel_id"));

        let configuration = option("room_configuration");
        if configuration.is_blank() {
            let or_default = |key: &str, default: i64| match option(key) {
                Param::Null => Param::Integer(default),
                value => value,
            };
            search.set_single_rooms_count(or_default("single_rooms_count", 1))?;
            search.set_double_rooms_count(or_default("double_rooms_count", 0))?;
        } else {
            search.set_room_configuration(&configuration.to_string())?;
        }
        Ok(search)
    }

    pub fn arrival_date(&self) -> Option<NaiveDate> {
        self.arrival_date
    }

    pub fn set_arrival_date(&mut self, value: impl Into<Param>) {
        self.arrival_date = lenient_date("arrival_date", &value.into());
    }

    pub fn departure_date(&self) -> Option<NaiveDate> {
        self.departure_date
    }

    pub fn set_departure_date(&mut self, value: impl Into<Param>) {
        self.departure_date = lenient_date("departure_date", &value.into());
    }

    pub fn city_id(&self) -> Option<i64> {
        self.city_id
    }

    pub fn set_city_id(&mut self, value: impl Into<Param>) {
        self.city_id = location_id_from(&value.into());
    }

    pub fn region_id(&self) -> Option<i64> {
        self.region_id
    }

    pub fn set_region_id(&mut self, value: impl Into<Param>) {
        self.region_id = location_id_from(&value.into());
    }

    pub fn hotel_id(&self) -> Option<i64> {
        self.hotel_id
    }

    pub fn set_hotel_id(&mut self, value: impl Into<Param>) {
        self.hotel_id = location_id_from(&value.into());
    }

    pub fn room_configuration(&self) -> &str {
        &self.room_configuration
    }

    // Derives the room counts from the rooms holding one or two adults
    pub fn set_room_configuration(&mut self, config: &str) -> Result<()> {
        let rooms = parse_room_configuration(config)?;
        let count = |adults: u32| rooms.values().filter(|room| room.adults == adults).count() as i64;

        self.room_configuration = config.to_string();
        self.single_rooms_count = count(1);
        self.double_rooms_count = count(2);
        Ok(())
    }

    pub fn single_rooms_count(&self) -> i64 {
        self.single_rooms_count
    }

    pub fn set_single_rooms_count(&mut self, count: impl Into<Param>) -> Result<()> {
        self.single_rooms_count = room_count(count.into())?;
        self.update_room_configuration();
        Ok(())
    }

    pub fn double_rooms_count(&self) -> i64 {
        self.double_rooms_count
    }

    pub fn set_double_rooms_count(&mut self, count: impl Into<Param>) -> Result<()> {
        self.double_rooms_count = room_count(count.into())?;
        self.update_room_configuration();
        Ok(())
    }

    fn update_room_configuration(&mut self) {
        let singles = SINGLE_ROOM.repeat(self.single_rooms_count as usize);
        let doubles = DOUBLE_ROOM.repeat(self.double_rooms_count as usize);
        self.room_configuration = singles + &doubles;
    }

    pub fn location_type(&self) -> Option<LocationType> {
        if self.city_id.is_some() {
            Some(LocationType::City)
        } else if self.region_id.is_some() {
            Some(LocationType::Region)
        } else if self.hotel_id.is_some() {
            Some(LocationType::Hotel)
        } else {
            None
        }
    }

    pub fn location_id(&self) -> Option<i64> {
        self.city_id.or(self.region_id).or(self.hotel_id)
    }

    pub fn to_params(&self) -> Params {
        params([
            ("location_type", Param::from(self.location_type().map(|t| t.name()))),
            ("location_id", Param::from(self.location_id())),
            ("arrival_date", Param::from(self.arrival_date)),
            ("departure_date", Param::from(self.departure_date)),
            ("single_rooms_count", Param::from(self.single_rooms_count)),
            ("double_rooms_count", Param::from(self.double_rooms_count)),
        ])
    }

    // Same dates and rooms, narrowed down to one hotel
    pub fn hotel_search(&self, hotel_id: i64) -> Result<HotelSearch> {
        HotelSearch::new(&params([
            ("arrival_date", Param::from(self.arrival_date)),
            ("departure_date", Param::from(self.departure_date)),
            ("hotel_id", Param::from(hotel_id)),
            ("room_configuration", Param::from(self.room_configuration.clone())),
        ]))
    }

    // Takes the hotel id off a result document
    pub fn hotel_search_for(&self, result: &Document) -> Result<HotelSearch> {
        let hotel_id = result.field("hotel_id")?.as_i64().ok_or_else(|| {
            TapiError::TypeMismatch(format!("hotel_id of {} is not an integer", result.kind()))
        })?;
        self.hotel_search(hotel_id)
    }
}

fn check_hotel(search: &HotelSearch, errors: &mut ValidationErrors) {
    let today = Local::now().date_naive();

    if let Some(arrival_date) = search.arrival_date {
        if arrival_date < today {
            errors.add("arrival_date", "The arrival date must not be in the past.");
        }
    }

    if search.single_rooms_count == 0 && search.double_rooms_count == 0 {
        errors.add("room_configuration", "Please choose at least one room.");
    }

    if search
        .single_rooms_count
        .saturating_add(search.double_rooms_count)
        > MAX_ROOMS as i64
    {
        errors.add("room_configuration", "Please choose no more than 3 rooms.");
    }

    if let (Some(arrival_date), Some(departure_date)) = (search.arrival_date, search.departure_date) {
        if departure_date <= arrival_date {
            errors.add(
                "departure_date",
                "The departure date must be at least one day after the arrival.",
            );
        }
    }

    if search.location_id().is_none() {
        errors.add("city_id", "Please choose where you want to stay.");
    }
}

impl Validate for HotelSearch {
    fn rules() -> RuleSet<Self> {
        RuleSet::new()
            .numericality_of(
                "single_rooms_count",
                |search: &HotelSearch| Param::Integer(search.single_rooms_count),
                "Please choose the number of single rooms.",
            )
            .numericality_of(
                "double_rooms_count",
                |search: &HotelSearch| Param::Integer(search.double_rooms_count),
                "Please choose the number of double rooms.",
            )
            .presence_of(
                "arrival_date",
                |search: &HotelSearch| Param::from(search.arrival_date),
                "Please choose a valid date.",
            )
            .presence_of(
                "departure_date",
                |search: &HotelSearch| Param::from(search.departure_date),
                "Please choose a valid date.",
            )
            .validate("hotel", check_hotel)
    }

    fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    fn errors_mut(&mut self) -> &mut ValidationErrors {
        &mut self.errors
    }
}

impl SearchQuery for HotelSearch {
    const NAME: &'static str = "HotelSearch";

    fn item_path(&self) -> &'static str {
        "hotels"
    }

    fn parameters(&self, config: &TapiConfig) -> Params {
        params([
            ("key", Param::from(config.key.clone())),
            ("format", Param::from("json")),
            ("city_id", Param::from(self.city_id)),
            ("region_id", Param::from(self.region_id)),
            ("hotel_id", Param::from(self.hotel_id)),
            ("arrival_date", Param::from(self.arrival_date)),
            ("departure_date", Param::from(self.departure_date)),
            ("room_configuration", Param::from(self.room_configuration.clone())),
        ])
    }
}

impl SearchSession<HotelSearch> {
    // `status_detailed.state` of the running search
    pub fn status(&self) -> Option<&Value> {
        self.document()?.document("status_detailed")?.get("state")
    }

    // Looked up once, then kept on the query
    pub async fn location(&mut self) -> Result<Option<&Document>> {
        if self.query().location.is_none() {
            let (Some(location_type), Some(id)) =
                (self.query().location_type(), self.query().location_id())
            else {
                return Ok(None);
            };

            let path = format!("/locations/{}/{}", location_type.collection(), id);
            let location = self
                .get(&path, Params::new())
                .await?
                .into_document(location_type.name())?;
            self.query_mut().location = Some(location);
        }
        Ok(self.query().location.as_ref())
    }
}
