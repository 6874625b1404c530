//! Table and Chart View Models
//!
//! Each view turns pointer input into selection writes and reads the shared
//! [`SelectionStore`] back for highlighting.

use crate::metrics::{AggregatedRow, ChartDataset};
use crate::selection::SelectionStore;

/// Tabular view over aggregated rows
#[derive(Debug)]
pub struct TableView<'a> {
    store: &'a SelectionStore,
    rows: Vec<AggregatedRow>,
}

impl<'a> TableView<'a> {
    /// Create a table view bound to a selection store
    pub fn new(store: &'a SelectionStore, rows: Vec<AggregatedRow>) -> Self {
        Self { store, rows }
    }

    /// Rows in display order
    pub fn rows(&self) -> &[AggregatedRow] {
        &self.rows
    }

    /// Replace rows after new samples arrive
    pub fn set_rows(&mut self, rows: Vec<AggregatedRow>) {
        self.rows = rows;
    }

    /// Pointer entered the row for `algorithm`
    pub fn pointer_enter(&self, algorithm: &str) -> bool {
        self.store.set_active([algorithm])
    }

    /// Pointer left the table body
    pub fn pointer_leave(&self) -> bool {
        self.store.set_active(Vec::<String>::new())
    }

    /// Whether the row for `algorithm` should be highlighted
    pub fn is_active(&self, algorithm: &str) -> bool {
        self.store.active().iter().any(|id| id == algorithm)
    }
}

/// Position of one point in the chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChartElement {
    /// Index into the dataset list
    pub dataset_index: usize,
    /// Index into the dataset's points
    pub index: usize,
}

/// Chart view over per-family datasets
#[derive(Debug)]
pub struct ChartView<'a> {
    store: &'a SelectionStore,
    datasets: Vec<ChartDataset>,
    active: Vec<ChartElement>,
    redraws: u64,
}

impl<'a> ChartView<'a> {
    /// Create a chart view bound to a selection store
    pub fn new(store: &'a SelectionStore, datasets: Vec<ChartDataset>) -> Self {
        Self {
            store,
            datasets,
            active: Vec::new(),
            redraws: 0,
        }
    }

    /// Datasets in display order
    pub fn datasets(&self) -> &[ChartDataset] {
        &self.datasets
    }

    /// Replace datasets after new samples arrive
    pub fn set_datasets(&mut self, datasets: Vec<ChartDataset>) {
        self.datasets = datasets;
    }

    /// Currently highlighted elements
    pub fn active_elements(&self) -> &[ChartElement] {
        &self.active
    }

    /// Number of highlight updates applied so far
    pub fn redraws(&self) -> u64 {
        self.redraws
    }

    /// Algorithm id at an element, if it exists
    pub fn algorithm_at(&self, element: ChartElement) -> Option<&str> {
        self.datasets
            .get(element.dataset_index)?
            .data
            .get(element.index)
            .map(|d| d.algorithm.as_str())
    }

    /// Locate each id; unknown ids map to the `(0, 0)` placeholder
    pub fn resolve(&self, ids: &[String]) -> Vec<ChartElement> {
        ids.iter()
            .map(|id| {
                self.datasets
                    .iter()
                    .enumerate()
                    .find_map(|(dataset_index, dataset)| {
                        dataset
                            .data
                            .iter()
                            .position(|d| &d.algorithm == id)
                            .map(|index| ChartElement {
                                dataset_index,
                                index,
                            })
                    })
                    .unwrap_or_default()
            })
            .collect()
    }

    /// Pointer is over `elements` (empty when over nothing)
    pub fn hover(&mut self, elements: &[ChartElement]) -> bool {
        let ids: Vec<String> = elements
            .iter()
            .filter_map(|e| self.algorithm_at(*e))
            .map(str::to_string)
            .collect();
        self.active = elements.to_vec();
        self.store.set_active(ids)
    }

    /// Apply the store's selection. Returns `false` when the highlighted
    /// elements already match, so no redraw is needed.
    pub fn sync(&mut self) -> bool {
        let resolved = self.resolve(&self.store.active());
        if resolved == self.active {
            return false;
        }
        self.active = resolved;
        self.redraws += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{chart_datasets, rows};
    use crate::sample::RawSample;

    fn samples() -> Vec<RawSample> {
        vec![
            RawSample::compression("lz4", 1.0, 50),
            RawSample::decompression("lz4", 1.0),
            RawSample::compression("zstd-1", 1.0, 40),
            RawSample::compression("zstd-3", 1.0, 30),
        ]
    }

    #[test]
    fn test_table_pointer_events() {
        let store = SelectionStore::new();
        let table = TableView::new(&store, rows(100, &samples()));

        assert!(table.pointer_enter("zstd-1"));
        assert!(table.is_active("zstd-1"));
        assert!(!table.is_active("lz4"));
        assert!(!table.pointer_enter("zstd-1"));

        assert!(table.pointer_leave());
        assert!(!table.is_active("zstd-1"));
        assert!(!table.pointer_leave());
    }

    #[test]
    fn test_chart_resolves_ids() {
        let store = SelectionStore::new();
        let chart = ChartView::new(&store, chart_datasets(100, &samples()));

        let resolved = chart.resolve(&["zstd-3".to_string(), "missing".to_string()]);
        assert_eq!(
            resolved,
            vec![
                ChartElement {
                    dataset_index: 1,
                    index: 1
                },
                ChartElement::default(),
            ]
        );
    }

    #[test]
    fn test_table_to_chart_sync() {
        let store = SelectionStore::new();
        let table = TableView::new(&store, rows(100, &samples()));
        let mut chart = ChartView::new(&store, chart_datasets(100, &samples()));

        table.pointer_enter("zstd-1");
        assert!(chart.sync());
        assert_eq!(
            chart.active_elements(),
            &[ChartElement {
                dataset_index: 1,
                index: 0
            }]
        );

        // Nothing changed, no second redraw
        assert!(!chart.sync());
        assert_eq!(chart.redraws(), 1);
    }

    #[test]
    fn test_chart_hover_does_not_echo() {
        let store = SelectionStore::new();
        let table = TableView::new(&store, rows(100, &samples()));
        let mut chart = ChartView::new(&store, chart_datasets(100, &samples()));

        let element = ChartElement {
            dataset_index: 0,
            index: 0,
        };
        assert!(chart.hover(&[element]));
        assert!(table.is_active("lz4"));

        // The chart already shows what the store holds
        assert!(!chart.sync());
        assert_eq!(chart.redraws(), 0);

        assert!(chart.hover(&[]));
        assert!(store.active().is_empty());
    }
}
