//! Registered synthetic-data handlers for `faker.<method>` parameters.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

use super::value::ParamValue;

pub type FakerFn = Arc<dyn Fn(&mut dyn RngCore) -> ParamValue + Send + Sync>;

const FIRST_NAMES: &[&str] = &[
    "James", "Mary", "Robert", "Patricia", "John", "Jennifer", "Michael", "Linda", "David",
    "Elizabeth", "William", "Barbara", "Richard", "Susan", "Joseph", "Jessica", "Thomas", "Sarah",
    "Charles", "Karen", "Daniel", "Nancy", "Matthew", "Lisa", "Anthony", "Betty", "Mark",
    "Margaret", "Steven", "Sandra", "Andrew", "Ashley", "Kenji", "Aiko", "Mateo", "Sofia",
];

const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Rodriguez",
    "Martinez", "Hernandez", "Lopez", "Gonzalez", "Wilson", "Anderson", "Thomas", "Taylor",
    "Moore", "Jackson", "Martin", "Lee", "Perez", "Thompson", "White", "Harris", "Sanchez",
    "Clark", "Ramirez", "Lewis", "Robinson", "Walker", "Young", "Tanaka", "Nakamura",
];

const STREET_NAMES: &[&str] = &[
    "Oak", "Maple", "Cedar", "Pine", "Elm", "Washington", "Lake", "Hill", "Park", "Main",
    "Sunset", "River", "Church", "Spring", "Highland", "Meadow",
];

const STREET_SUFFIXES: &[&str] = &["St", "Ave", "Blvd", "Rd", "Ln", "Dr", "Ct", "Way"];

const CITIES: &[(&str, &str)] = &[
    ("Springfield", "IL"),
    ("Portland", "OR"),
    ("Austin", "TX"),
    ("Madison", "WI"),
    ("Columbus", "OH"),
    ("Raleigh", "NC"),
    ("Boise", "ID"),
    ("Tucson", "AZ"),
    ("Albany", "NY"),
    ("Savannah", "GA"),
];

const EMAIL_DOMAINS: &[&str] = &["example.com", "example.org", "example.net", "mail.test"];

fn pick<'a>(rng: &mut dyn RngCore, items: &[&'a str]) -> &'a str {
    items.choose(rng).copied().unwrap_or_default()
}

fn first_name(rng: &mut dyn RngCore) -> String {
    pick(rng, FIRST_NAMES).to_string()
}

fn last_name(rng: &mut dyn RngCore) -> String {
    pick(rng, LAST_NAMES).to_string()
}

fn email(rng: &mut dyn RngCore) -> String {
    let first = pick(rng, FIRST_NAMES).to_lowercase();
    let last = pick(rng, LAST_NAMES).to_lowercase();
    let suffix: u16 = rng.gen_range(1..1000);
    format!("{}.{}{}@{}", first, last, suffix, pick(rng, EMAIL_DOMAINS))
}

fn phone(rng: &mut dyn RngCore) -> String {
    format!(
        "({:03}) {:03}-{:04}",
        rng.gen_range(200..1000),
        rng.gen_range(200..1000),
        rng.gen_range(0..10000)
    )
}

fn address(rng: &mut dyn RngCore) -> String {
    let (city, state) = CITIES.choose(rng).copied().unwrap_or(("Springfield", "IL"));
    format!(
        "{} {} {}\n{}, {} {:05}",
        rng.gen_range(1..10000),
        pick(rng, STREET_NAMES),
        pick(rng, STREET_SUFFIXES),
        city,
        state,
        rng.gen_range(10000..100000)
    )
}

fn date_of_birth(rng: &mut dyn RngCore) -> String {
    let days = rng.gen_range(18 * 365..90 * 365);
    (Utc::now() - Duration::days(days))
        .format("%Y-%m-%d")
        .to_string()
}

fn timestamp(rng: &mut dyn RngCore) -> i64 {
    rng.gen_range(0..=Utc::now().timestamp())
}

/// Lookup table from lower-cased method name to handler. Populated once and
/// consulted by name; unknown methods fail closed.
#[derive(Clone)]
pub struct FakerRegistry {
    handlers: HashMap<String, FakerFn>,
}

impl FakerRegistry {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, method: &str, handler: F)
    where
        F: Fn(&mut dyn RngCore) -> ParamValue + Send + Sync + 'static,
    {
        self.handlers
            .insert(method.to_ascii_lowercase(), Arc::new(handler));
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(&method.to_ascii_lowercase())
    }

    pub fn generate(&self, method: &str, rng: &mut dyn RngCore) -> Option<ParamValue> {
        self.handlers
            .get(&method.to_ascii_lowercase())
            .map(|handler| handler(rng))
    }

    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

impl Default for FakerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("firstname", |rng| ParamValue::Text(first_name(rng)));
        registry.register("lastname", |rng| ParamValue::Text(last_name(rng)));
        registry.register("fullname", |rng| {
            ParamValue::Text(format!("{} {}", first_name(rng), last_name(rng)))
        });
        registry.register("email", |rng| ParamValue::Text(email(rng)));
        registry.register("phone", |rng| ParamValue::Text(phone(rng)));
        registry.register("address", |rng| ParamValue::Text(address(rng)));
        registry.register("dateofbirth", |rng| ParamValue::Text(date_of_birth(rng)));
        registry.register("timestamp", |rng| ParamValue::Int(timestamp(rng)));
        registry
    }
}

impl fmt::Debug for FakerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<_> = self.methods().collect();
        methods.sort_unstable();
        f.debug_struct("FakerRegistry")
            .field("methods", &methods)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_methods_are_case_insensitive() {
        let registry = FakerRegistry::default();
        assert!(registry.contains("Email"));
        assert!(registry.contains("FIRSTNAME"));
        assert!(!registry.contains("favourite_colour"));
    }

    #[test]
    fn email_looks_like_an_address() {
        let registry = FakerRegistry::default();
        let value = registry.generate("email", &mut rand::thread_rng()).unwrap();
        match value {
            ParamValue::Text(s) => {
                let (local, domain) = s.split_once('@').unwrap();
                assert!(!local.is_empty());
                assert!(domain.contains('.'));
            }
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn custom_handler_is_used() {
        let mut registry = FakerRegistry::empty();
        registry.register("sku", |_| ParamValue::Text("SKU-1".to_string()));
        assert_eq!(
            registry.generate("sku", &mut rand::thread_rng()),
            Some(ParamValue::Text("SKU-1".to_string()))
        );
        assert_eq!(registry.generate("email", &mut rand::thread_rng()), None);
    }
}
