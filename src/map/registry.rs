// src/map/registry.rs

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;

/// Prefix shared by every output series code.
pub const SERIES_PREFIX: &str = "NABIMFD";

/// Registry countries in output column order.
const COUNTRIES: &[(&str, &str)] = &[
    ("Australia", "AUS"),
    ("Austria", "AUT"),
    ("Belgium", "BEL"),
    ("Brazil", "BRA"),
    ("Canada", "CAN"),
    ("Chile", "CHL"),
    ("China", "CHN"),
    ("Cyprus", "CYP"),
    ("Denmark", "DNK"),
    ("Finland", "FIN"),
    ("France", "FRA"),
    ("Germany", "DEU"),
    ("Greece", "GRC"),
    ("India", "IND"),
    ("Ireland", "IRL"),
    ("Israel", "ISR"),
    ("Italy", "ITA"),
    ("Japan", "JPN"),
    ("Korea", "KOR"),
    ("Kuwait", "KWT"),
    ("Luxembourg", "LUX"),
    ("Malaysia", "MYS"),
    ("Mexico", "MEX"),
    ("Netherlands", "NLD"),
    ("New Zealand", "NZL"),
    ("Norway", "NOR"),
    ("Philippines", "PHL"),
    ("Poland", "POL"),
    ("Portugal", "PRT"),
    ("Russian Federation", "RUS"),
    ("Saudi Arabia", "SAU"),
    ("Singapore", "SGP"),
    ("South Africa", "ZAF"),
    ("Spain", "ESP"),
    ("Sweden", "SWE"),
    ("Switzerland", "CHE"),
    ("Thailand", "THA"),
    ("United Kingdom", "GBR"),
    ("United States", "USA"),
    ("Hong Kong", "HKG"),
];

/// Extra names that point at an existing registry entry. The alias is also the
/// name shown in the output label row.
const NAME_ALIASES: &[(&str, &str)] = &[("Russia", "Russian Federation")];

/// Member codes accepted verbatim. Hong Kong never reports one.
const CODE_TIER: &[&str] = &[
    "AUS", "AUT", "BEL", "BRA", "CAN", "CHL", "CHN", "CYP", "DNK", "FIN", "FRA", "DEU", "GRC",
    "IND", "IRL", "ISR", "ITA", "JPN", "KOR", "KWT", "LUX", "MYS", "MEX", "NLD", "NZL", "NOR",
    "PHL", "POL", "PRT", "RUS", "SAU", "SGP", "ZAF", "ESP", "SWE", "CHE", "THA", "GBR", "USA",
];

/// Full-form member names seen in the source, matched by equality or containment.
const ALIAS_TIER: &[(&str, &[&str])] = &[
    ("Australia", &["Australia"]),
    ("Austria", &["Austria"]),
    ("Belgium", &["Belgium"]),
    ("Hong Kong", &["Hong Kong Monetary Authority", "HKMA"]),
    ("Chile", &["Chile (Banco Central de Chile)"]),
    ("Denmark", &["Denmark (Danmarks Nationalbank)"]),
    ("Germany", &["Germany (Deutsche Bundesbank)"]),
    ("Israel", &["Israel (Bank of Israel)"]),
    ("Netherlands", &["Netherlands, The"]),
    ("Philippines", &["Philippines (Bangko Sentral ng Pilipinas)"]),
    (
        "Poland",
        &["Poland, Republic of (National Bank of Poland)"],
    ),
    ("Portugal", &["Portugal (Banco de Portugal)"]),
    ("Sweden", &["Sweden (Sveriges Riksbank)"]),
    ("Switzerland", &["Switzerland (Swiss National Bank)"]),
];

/// Countries whose bare name is unambiguous enough to match on its own.
const NAME_TIER: &[&str] = &[
    "Brazil",
    "Canada",
    "China",
    "Cyprus",
    "Finland",
    "France",
    "Greece",
    "India",
    "Ireland",
    "Italy",
    "Japan",
    "Korea",
    "Kuwait",
    "Luxembourg",
    "Malaysia",
    "Mexico",
    "New Zealand",
    "Norway",
    "Russian Federation",
    "Saudi Arabia",
    "Singapore",
    "South Africa",
    "Spain",
    "Thailand",
    "United Kingdom",
    "United States",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Country {
    pub name: &'static str,
    pub iso3: &'static str,
    /// Name used in the output label row.
    pub label: &'static str,
    /// Output series code, `NABIMFD.<ISO3>.M`.
    pub code: String,
}

/// Immutable lookup of registry countries, built once on first use.
pub struct CountryRegistry {
    countries: Vec<Country>,
    by_name: HashMap<&'static str, usize>,
    by_iso3: HashMap<&'static str, usize>,
    by_code: HashMap<String, usize>,
}

pub static REGISTRY: Lazy<CountryRegistry> = Lazy::new(CountryRegistry::build);

impl CountryRegistry {
    fn build() -> Self {
        let mut countries: Vec<Country> = COUNTRIES
            .iter()
            .map(|&(name, iso3)| Country {
                name,
                iso3,
                label: name,
                code: format!("{}.{}.M", SERIES_PREFIX, iso3),
            })
            .collect();

        let mut by_name = HashMap::new();
        let mut by_iso3 = HashMap::new();
        let mut by_code = HashMap::new();
        for (idx, c) in countries.iter().enumerate() {
            by_name.insert(c.name, idx);
            by_iso3.insert(c.iso3, idx);
            by_code.insert(c.code.clone(), idx);
        }
        for &(alias, canonical) in NAME_ALIASES {
            if let Some(&idx) = by_name.get(canonical) {
                by_name.insert(alias, idx);
                countries[idx].label = alias;
            }
        }

        Self {
            countries,
            by_name,
            by_iso3,
            by_code,
        }
    }

    /// Countries in declaration (= column) order.
    pub fn countries(&self) -> &[Country] {
        &self.countries
    }

    pub fn by_name(&self, name: &str) -> Option<&Country> {
        self.by_name.get(name).map(|&i| &self.countries[i])
    }

    pub fn by_iso3(&self, iso3: &str) -> Option<&Country> {
        self.by_iso3.get(iso3).map(|&i| &self.countries[i])
    }

    pub fn by_code(&self, code: &str) -> Option<&Country> {
        self.by_code.get(code).map(|&i| &self.countries[i])
    }

    /// Output column layout: the date/label column, then every series code.
    pub fn column_order(&self) -> Vec<&str> {
        std::iter::once("")
            .chain(self.countries.iter().map(|c| c.code.as_str()))
            .collect()
    }

    /// Position of `code` in [`column_order`](Self::column_order).
    pub fn column_index(&self, code: &str) -> Option<usize> {
        self.by_code.get(code).map(|&i| i + 1)
    }
}

/// Which rule matched a member to a country.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Code,
    Alias,
    Name,
}

impl MatchTier {
    pub fn as_str(&self) -> &str {
        match self {
            MatchTier::Code => "code",
            MatchTier::Alias => "alias",
            MatchTier::Name => "name",
        }
    }
}

/// Outcome of resolving one source member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved {
        country: &'static Country,
        tier: MatchTier,
    },
    Unmapped,
}

type Tier = fn(&CountryRegistry, &str, &str) -> Option<usize>;

/// Resolution tiers from most to least specific; the first match wins.
const TIERS: &[(MatchTier, Tier)] = &[
    (MatchTier::Code, match_code),
    (MatchTier::Alias, match_alias),
    (MatchTier::Name, match_name),
];

/// Resolve a source member to a registry country.
pub fn resolve(member_name: &str, member_code: &str) -> Resolution {
    let registry: &'static CountryRegistry = &REGISTRY;
    let name = member_name.trim();
    let code = member_code.trim();

    TIERS
        .iter()
        .find_map(|&(tier, matcher)| {
            matcher(registry, name, code).map(|idx| Resolution::Resolved {
                country: &registry.countries[idx],
                tier,
            })
        })
        .unwrap_or(Resolution::Unmapped)
}

fn match_code(registry: &CountryRegistry, _name: &str, code: &str) -> Option<usize> {
    if code.is_empty() {
        return None;
    }
    let code = code.to_ascii_uppercase();
    CODE_TIER
        .iter()
        .find(|iso3| **iso3 == code)
        .and_then(|iso3| registry.by_iso3.get(iso3).copied())
}

fn match_alias(registry: &CountryRegistry, name: &str, _code: &str) -> Option<usize> {
    let lowered = name.to_lowercase();
    ALIAS_TIER
        .iter()
        .find(|(_, variants)| {
            variants
                .iter()
                .any(|v| v.to_lowercase() == lowered || name.contains(v))
        })
        .and_then(|(country, _)| registry.by_name.get(country).copied())
}

fn match_name(registry: &CountryRegistry, name: &str, _code: &str) -> Option<usize> {
    let lowered = name.to_lowercase();
    NAME_TIER
        .iter()
        .find(|country| country.to_lowercase() == lowered)
        .and_then(|country| registry.by_name.get(country).copied())
}
