use tracing::warn;

use crate::map::registry::CountryRegistry;

/// Facility label that selects the rows we publish.
pub const TARGET_FACILITY: &str = "New Arrangement to Borrow";

const LABEL_PREFIX: &str = "New Arrangement to Borrow IMF Data: ";

/// The three-row wide layout written to the spreadsheet.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTable {
    /// Row 1: column order, label column first.
    pub codes: Vec<String>,
    /// Row 2: human-readable series names; the first cell is empty.
    pub labels: Vec<String>,
    /// Row 3, first cell.
    pub date: String,
    /// Row 3, remaining cells, one per code (index 0 is unused and stays `None`).
    pub values: Vec<Option<f64>>,
}

impl OutputTable {
    pub fn width(&self) -> usize {
        self.codes.len()
    }

    /// Value stored under `code`, if any.
    pub fn value(&self, code: &str) -> Option<f64> {
        self.codes
            .iter()
            .position(|c| !c.is_empty() && c == code)
            .and_then(|i| self.values[i])
    }

    pub fn populated(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }
}

/// Fills an [`OutputTable`] one matched record at a time.
pub struct TableBuilder<'a> {
    registry: &'a CountryRegistry,
    table: OutputTable,
    duplicates: usize,
}

impl<'a> TableBuilder<'a> {
    pub fn new(registry: &'a CountryRegistry, date: impl Into<String>) -> Self {
        let codes: Vec<String> = registry
            .column_order()
            .into_iter()
            .map(str::to_string)
            .collect();
        let labels = codes
            .iter()
            .map(|code| match registry.by_code(code) {
                Some(country) => format!("{}{}", LABEL_PREFIX, country.label),
                None => String::new(),
            })
            .collect();
        let values = vec![None; codes.len()];

        Self {
            registry,
            table: OutputTable {
                codes,
                labels,
                date: date.into(),
                values,
            },
            duplicates: 0,
        }
    }

    /// Store `amount` under `code`. A second write to the same column replaces
    /// the first; the replaced value is returned and the overwrite is counted.
    pub fn insert(&mut self, code: &str, amount: f64) -> Option<f64> {
        let Some(idx) = self.registry.column_index(code) else {
            warn!(code, "series code has no output column");
            return None;
        };
        let previous = self.table.values[idx].replace(amount);
        if let Some(prev) = previous {
            self.duplicates += 1;
            warn!(code, previous = prev, replacement = amount, "duplicate match for column, keeping the later record");
        }
        previous
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn finish(self) -> OutputTable {
        self.table
    }
}

/// Keep only rows for the target facility, ignoring surrounding whitespace.
pub fn is_target_facility(facility: &str) -> bool {
    facility.trim() == TARGET_FACILITY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::registry::REGISTRY;

    #[test]
    fn facility_filter_trims_but_is_exact() {
        assert!(is_target_facility("New Arrangement to Borrow  "));
        assert!(is_target_facility("  New Arrangement to Borrow"));
        assert!(!is_target_facility("Stand-By Arrangement"));
        assert!(!is_target_facility("new arrangement to borrow"));
        assert!(!is_target_facility("New Arrangement to Borrow (NAB)"));
    }

    #[test]
    fn empty_table_has_headers_and_no_values() {
        let table = TableBuilder::new(&REGISTRY, "2025-06").finish();
        assert_eq!(table.width(), 41);
        assert_eq!(table.labels.len(), 41);
        assert_eq!(table.values.len(), 41);
        assert_eq!(table.codes[0], "");
        assert_eq!(table.labels[0], "");
        assert_eq!(
            table.labels[11],
            "New Arrangement to Borrow IMF Data: France"
        );
        assert_eq!(
            table.labels[30],
            "New Arrangement to Borrow IMF Data: Russia"
        );
        assert_eq!(table.codes[30], "NABIMFD.RUS.M");
        assert_eq!(table.date, "2025-06");
        assert_eq!(table.populated(), 0);
    }

    #[test]
    fn insert_places_value_in_its_column() {
        let mut builder = TableBuilder::new(&REGISTRY, "2025-06");
        assert_eq!(builder.insert("NABIMFD.FRA.M", 500_000.0), None);
        let table = builder.finish();
        assert_eq!(table.values[11], Some(500_000.0));
        assert_eq!(table.value("NABIMFD.FRA.M"), Some(500_000.0));
        assert_eq!(table.value("NABIMFD.DEU.M"), None);
        assert_eq!(table.populated(), 1);
    }

    #[test]
    fn later_duplicate_wins_and_is_counted() {
        let mut builder = TableBuilder::new(&REGISTRY, "2025-06");
        builder.insert("NABIMFD.JPN.M", 1.0);
        assert_eq!(builder.insert("NABIMFD.JPN.M", 2.0), Some(1.0));
        assert_eq!(builder.duplicates(), 1);
        assert_eq!(builder.finish().value("NABIMFD.JPN.M"), Some(2.0));
    }

    #[test]
    fn unknown_code_is_ignored() {
        let mut builder = TableBuilder::new(&REGISTRY, "2025-06");
        assert_eq!(builder.insert("NABIMFD.ATL.M", 5.0), None);
        assert_eq!(builder.finish().populated(), 0);
    }
}
