//! Core domain model for the rigforge build planner.
//!
//! A PC build is assembled from independent hardware [`Component`]s, each
//! carrying an open attribute map alongside a fixed [`Category`].  The
//! structures here are serialisable through flat record types so that they
//! can be stored or transferred as JSON by a storage backend.
//!
//! The crate is split into:
//!
//! * the component model in this module – [`Category`], [`AttrValue`],
//!   [`Component`] and its factory construction path;
//! * [`build`] – the owning [`build::Build`] aggregate with its derived
//!   metrics and persistable form;
//! * [`compat`] – the ordered compatibility rule engine, the single source
//!   of truth for whether a build hangs together;
//! * [`share`] – short public share-key generation and allocation;
//! * [`store`] – the storage contract the core consumes, as plain traits so
//!   backends can be injected rather than reached through global state.

pub mod build;
pub mod compat;
pub mod share;
pub mod store;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use build::{Build, BuildError, BuildRecord};
pub use compat::{RuleId, RuleResult, Verdict};
pub use store::{BuildStore, ComponentStore, StoreError};

/// Marker substituted for attributes a component does not carry when
/// rendering specification rows.
pub const NOT_APPLICABLE: &str = "N/A";

#[derive(Error, Debug)]
pub enum ComponentError {
    #[error("unknown component category: {0:?}")]
    UnknownCategory(String),
    #[error("price cannot be negative: {0}")]
    NegativePrice(f64),
}

/// The eight hardware categories a build draws from.
///
/// Variant order is display order; it also fixes the iteration order of
/// every category-keyed map in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")] // serialize and deserialize as the display label
pub enum Category {
    Cpu,
    Motherboard,
    Ram,
    Gpu,
    Storage,
    Psu,
    Case,
    Cooler,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Cpu,
        Category::Motherboard,
        Category::Ram,
        Category::Gpu,
        Category::Storage,
        Category::Psu,
        Category::Case,
        Category::Cooler,
    ];

    /// Canonical label, as stored in records and shown in the UI.
    pub const fn label(&self) -> &'static str {
        match self {
            Category::Cpu => "CPU",
            Category::Motherboard => "Motherboard",
            Category::Ram => "RAM",
            Category::Gpu => "GPU",
            Category::Storage => "Storage",
            Category::Psu => "PSU",
            Category::Case => "Case",
            Category::Cooler => "Cooler",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CPU" => Ok(Category::Cpu),
            "Motherboard" => Ok(Category::Motherboard),
            "RAM" => Ok(Category::Ram),
            "GPU" => Ok(Category::Gpu),
            "Storage" => Ok(Category::Storage),
            "PSU" => Ok(Category::Psu),
            "Case" => Ok(Category::Case),
            "Cooler" => Ok(Category::Cooler),
            _ => Err(format!("unknown component category: '{s}'")),
        }
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        c.label().to_owned()
    }
}

impl TryFrom<String> for Category {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Scalar attribute value: components carry an open, category-specific map
/// of these keyed by attribute name.
///
/// Serialized untagged, so record JSON stays flat
/// (`{"socket": "AM5", "power_draw": 120}`).  `Int` is tried before `Float`
/// and whole numbers deserialize as integers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    String(String),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer reading: floats truncate, strings are trimmed and parsed.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            AttrValue::Float(f) => Some(*f as i64),
            AttrValue::String(s) => s.trim().parse().ok(),
        }
    }

    /// Numeric reading: strings are trimmed and parsed.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttrValue::Int(i) => Some(*i as f64),
            AttrValue::Float(f) => Some(*f),
            AttrValue::String(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Int(i) => write!(f, "{i}"),
            AttrValue::Float(v) => write!(f, "{v}"),
            AttrValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::String(s.to_owned())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::String(s)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Int(i)
    }
}

impl From<f64> for AttrValue {
    fn from(f: f64) -> Self {
        AttrValue::Float(f)
    }
}

/// A single hardware part.
///
/// Everything except the price is immutable after construction, and the only
/// construction path is the factory ([`Component::create`] /
/// [`Component::from_record`]), which is where the category label is
/// validated.  A component therefore can never disagree with its category
/// tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    id: String,
    name: String,
    category: Category,
    price: f64,
    attributes: BTreeMap<String, AttrValue>,
}

/// Flat serializable form of a [`Component`] for the persistence boundary.
///
/// The category is kept as its label so that stale or hand-edited stored
/// data surfaces as a factory error on the way back in, not as a bogus
/// component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub id: String,
    pub name: String,
    pub category: String,
    pub price: f64,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrValue>,
}

impl Component {
    /// Factory entry point: map a category label to the category tag and
    /// construct the component from raw attributes.
    pub fn create(
        id: impl Into<String>,
        name: impl Into<String>,
        category: &str,
        price: f64,
        attributes: BTreeMap<String, AttrValue>,
    ) -> Result<Self, ComponentError> {
        let category = category
            .parse()
            .map_err(|_| ComponentError::UnknownCategory(category.to_owned()))?;
        Self::new(id, name, category, price, attributes)
    }

    /// Construct with an already-resolved category tag.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: Category,
        price: f64,
        attributes: BTreeMap<String, AttrValue>,
    ) -> Result<Self, ComponentError> {
        if price < 0.0 {
            return Err(ComponentError::NegativePrice(price));
        }
        Ok(Self {
            id: id.into(),
            name: name.into(),
            category,
            price,
            attributes,
        })
    }

    /// Rebuild a component from its persisted record.
    pub fn from_record(record: ComponentRecord) -> Result<Self, ComponentError> {
        Self::create(
            record.id,
            record.name,
            &record.category,
            record.price,
            record.attributes,
        )
    }

    pub fn to_record(&self) -> ComponentRecord {
        ComponentRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            category: self.category.label().to_owned(),
            price: self.price,
            attributes: self.attributes.clone(),
        }
    }

    // Accessors --------------------------------------------------------------

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    /// Update the price. Negative values are rejected and the prior value is
    /// kept.
    pub fn set_price(&mut self, price: f64) -> Result<(), ComponentError> {
        if price < 0.0 {
            return Err(ComponentError::NegativePrice(price));
        }
        self.price = price;
        Ok(())
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttrValue> {
        &self.attributes
    }

    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    pub fn str_attr(&self, key: &str) -> Option<&str> {
        self.attr(key).and_then(AttrValue::as_str)
    }

    /// Missing and unparseable attributes both read as `None`.
    pub fn int_attr(&self, key: &str) -> Option<i64> {
        self.attr(key).and_then(AttrValue::as_int)
    }

    pub fn float_attr(&self, key: &str) -> Option<f64> {
        self.attr(key).and_then(AttrValue::as_float)
    }

    // Category-specific behavior ---------------------------------------------

    /// Ordered `(label, formatted value)` rows for display.
    ///
    /// Pure formatting: attributes the component does not carry render as
    /// [`NOT_APPLICABLE`] rather than failing.
    pub fn specifications(&self) -> Vec<(&'static str, String)> {
        match self.category {
            Category::Cpu => vec![
                ("Cores", self.format_attr("cores", "")),
                ("Base Clock", self.format_attr("base_clock", " GHz")),
                ("Boost Clock", self.format_attr("boost_clock", " GHz")),
                ("Socket", self.format_attr("socket", "")),
                ("TDP", self.format_attr("tdp", " W")),
            ],
            Category::Motherboard => vec![
                ("Socket", self.format_attr("socket", "")),
                ("Form Factor", self.format_attr("form_factor", "")),
                ("Memory Type", self.format_attr("memory_type", "")),
                ("Memory Slots", self.format_attr("memory_slots", "")),
                ("Max Memory", self.format_attr("max_memory", " GB")),
            ],
            Category::Ram => vec![
                ("Capacity", self.format_attr("capacity", " GB")),
                ("Speed", self.format_attr("speed", " MHz")),
                ("Memory Type", self.format_attr("memory_type", "")),
                ("Sticks", self.format_attr("sticks", "")),
            ],
            Category::Gpu => vec![
                ("VRAM", self.format_attr("vram", " GB")),
                ("Interface", self.format_attr("interface", "")),
                ("Power Draw", self.format_attr("power_draw", " W")),
                ("Length", self.format_attr("length_mm", " mm")),
            ],
            Category::Storage => vec![
                ("Capacity", self.format_attr("capacity", "")),
                ("Type", self.format_attr("type", "")),
                ("Interface", self.format_attr("interface", "")),
                ("Read Speed", self.format_attr("read_speed", " MB/s")),
            ],
            Category::Psu => vec![
                ("Wattage", self.format_attr("wattage", " W")),
                ("Efficiency", self.format_attr("efficiency", "")),
                ("Modular", self.format_attr("modular", "")),
            ],
            Category::Case => vec![
                (
                    "Supported Form Factors",
                    self.format_attr("supported_form_factors", ""),
                ),
                ("Max GPU Length", self.format_attr("max_gpu_length_mm", " mm")),
                ("Fans Included", self.format_attr("fans", "")),
            ],
            Category::Cooler => vec![
                ("Type", self.format_attr("type", "")),
                ("Fan Size", self.format_attr("fan_size", " mm")),
                ("Height", self.format_attr("height", " mm")),
                ("TDP Rating", self.format_attr("tdp_rating", " W")),
            ],
        }
    }

    fn format_attr(&self, key: &str, suffix: &str) -> String {
        match self.attr(key) {
            Some(value) => format!("{value}{suffix}"),
            None => NOT_APPLICABLE.to_owned(),
        }
    }

    /// One-directional compatibility check initiated by this component.
    ///
    /// Each category only judges the pairings it has an opinion about;
    /// everything else is "no constraint".  Checks are deliberately
    /// asymmetric per pair (the motherboard reuses the CPU's socket verdict
    /// instead of re-implementing it), so callers wanting the authoritative
    /// bidirectional answer must go through [`compat::evaluate`].
    pub fn compatible_with(&self, other: &Component) -> (bool, String) {
        match (self.category, other.category) {
            (Category::Cpu, Category::Motherboard) => {
                let cpu_socket = self.str_attr("socket").unwrap_or_default();
                let mobo_socket = other.str_attr("socket").unwrap_or_default();
                if cpu_socket == mobo_socket {
                    (true, "Compatible sockets".to_owned())
                } else {
                    (
                        false,
                        format!(
                            "Incompatible sockets: CPU {cpu_socket} vs motherboard {mobo_socket}"
                        ),
                    )
                }
            }
            (Category::Motherboard, Category::Cpu) => other.compatible_with(self),
            (Category::Motherboard, Category::Ram) => {
                let mobo_type = self.str_attr("memory_type").unwrap_or_default();
                let ram_type = other.str_attr("memory_type").unwrap_or_default();
                if mobo_type == ram_type {
                    (true, format!("Compatible memory type ({mobo_type})"))
                } else {
                    (
                        false,
                        format!("Incompatible memory types: {ram_type} vs {mobo_type}"),
                    )
                }
            }
            (Category::Ram, Category::Motherboard) => other.compatible_with(self),
            (Category::Case, Category::Motherboard) => {
                let supported = self.str_attr("supported_form_factors").unwrap_or_default();
                let mobo_ff = other.str_attr("form_factor").unwrap_or_default();
                if supported.split(',').any(|ff| ff.trim() == mobo_ff) {
                    (true, "Compatible form factors".to_owned())
                } else {
                    (
                        false,
                        format!("Case supports {supported}, motherboard is {mobo_ff}"),
                    )
                }
            }
            (Category::Case, Category::Gpu) => {
                match (
                    other.float_attr("length_mm"),
                    self.float_attr("max_gpu_length_mm"),
                ) {
                    (Some(len), Some(max)) if len > max => (
                        false,
                        format!("GPU length {len}mm exceeds case maximum {max}mm"),
                    ),
                    _ => (true, "GPU fits in case".to_owned()),
                }
            }
            _ => (true, "No compatibility constraints".to_owned()),
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({:.2})", self.category, self.name, self.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, AttrValue)]) -> BTreeMap<String, AttrValue> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn factory_rejects_unknown_category() {
        let err = Component::create("x1", "Mystery Part", "Soundcard", 10.0, BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, ComponentError::UnknownCategory(label) if label == "Soundcard"));
    }

    #[test]
    fn factory_accepts_all_known_labels() {
        for category in Category::ALL {
            let part =
                Component::create("id", "part", category.label(), 1.0, BTreeMap::new()).unwrap();
            assert_eq!(part.category(), category);
        }
    }

    #[test]
    fn negative_price_rejected_and_prior_value_kept() {
        let mut cpu = Component::create("c1", "Ryzen 5", "CPU", 199.99, BTreeMap::new()).unwrap();
        assert!(cpu.set_price(-1.0).is_err());
        assert_eq!(cpu.price(), 199.99);
        cpu.set_price(149.99).unwrap();
        assert_eq!(cpu.price(), 149.99);

        assert!(Component::create("c2", "Bad", "CPU", -5.0, BTreeMap::new()).is_err());
    }

    #[test]
    fn specifications_substitute_marker_for_missing_attributes() {
        let cpu = Component::create(
            "c1",
            "Ryzen 5",
            "CPU",
            199.99,
            attrs(&[("cores", AttrValue::Int(6)), ("socket", "AM5".into())]),
        )
        .unwrap();
        let specs = cpu.specifications();
        assert_eq!(specs[0], ("Cores", "6".to_owned()));
        assert_eq!(specs[1], ("Base Clock", NOT_APPLICABLE.to_owned()));
        assert_eq!(specs[3], ("Socket", "AM5".to_owned()));
    }

    #[test]
    fn record_round_trip_preserves_arbitrary_attributes() {
        let attributes = attrs(&[
            ("socket", "AM5".into()),
            ("cores", AttrValue::Int(8)),
            ("boost_clock", AttrValue::Float(5.4)),
            ("completely_custom", "kept verbatim".into()),
        ]);
        let cpu = Component::create("c9", "Ryzen 7", "CPU", 329.0, attributes).unwrap();

        let json = serde_json::to_string(&cpu.to_record()).unwrap();
        let record: ComponentRecord = serde_json::from_str(&json).unwrap();
        let back = Component::from_record(record).unwrap();
        assert_eq!(back, cpu);
    }

    #[test]
    fn attr_value_readings() {
        assert_eq!(AttrValue::String(" 240 ".into()).as_int(), Some(240));
        assert_eq!(AttrValue::String("240mm".into()).as_int(), None);
        assert_eq!(AttrValue::Float(5.9).as_int(), Some(5));
        assert_eq!(AttrValue::Int(120).as_float(), Some(120.0));
        assert_eq!(AttrValue::String("1.25".into()).as_float(), Some(1.25));
    }

    #[test]
    fn cpu_judges_motherboard_and_motherboard_delegates() {
        let cpu = Component::create(
            "c1",
            "Ryzen 5",
            "CPU",
            199.0,
            attrs(&[("socket", "AM5".into())]),
        )
        .unwrap();
        let mobo = Component::create(
            "m1",
            "Z790 Board",
            "Motherboard",
            249.0,
            attrs(&[("socket", "LGA1700".into())]),
        )
        .unwrap();

        let (ok, message) = cpu.compatible_with(&mobo);
        assert!(!ok);
        assert!(message.contains("AM5") && message.contains("LGA1700"));

        // Reverse direction reuses the CPU's verdict.
        assert_eq!(mobo.compatible_with(&cpu), cpu.compatible_with(&mobo));
    }

    #[test]
    fn unrelated_pairs_have_no_constraint() {
        let storage = Component::create("s1", "1TB NVMe", "Storage", 89.0, BTreeMap::new()).unwrap();
        let cooler = Component::create("k1", "Tower Cooler", "Cooler", 35.0, BTreeMap::new()).unwrap();
        let (ok, _) = storage.compatible_with(&cooler);
        assert!(ok);
    }

    #[test]
    fn case_judges_motherboard_by_delimited_membership() {
        let case = Component::create(
            "case1",
            "Mid Tower",
            "Case",
            99.0,
            attrs(&[("supported_form_factors", "ATX, Micro-ATX, Mini-ITX".into())]),
        )
        .unwrap();
        let mobo = Component::create(
            "m1",
            "B650 Board",
            "Motherboard",
            179.0,
            attrs(&[("form_factor", "Micro-ATX".into())]),
        )
        .unwrap();
        let (ok, _) = case.compatible_with(&mobo);
        assert!(ok);

        let e_atx = Component::create(
            "m2",
            "Workstation Board",
            "Motherboard",
            399.0,
            attrs(&[("form_factor", "E-ATX".into())]),
        )
        .unwrap();
        let (ok, message) = case.compatible_with(&e_atx);
        assert!(!ok);
        assert!(message.contains("E-ATX"));
    }

    #[test]
    fn category_serde_uses_labels() {
        let json = serde_json::to_string(&Category::Motherboard).unwrap();
        assert_eq!(json, "\"Motherboard\"");
        let back: Category = serde_json::from_str("\"RAM\"").unwrap();
        assert_eq!(back, Category::Ram);
        assert!(serde_json::from_str::<Category>("\"Monitor\"").is_err());
    }
}
