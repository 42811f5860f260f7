use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::{Interval, Period, Symbol};

/// Market keys accepted by the market summary endpoint.
pub const AVAILABLE_MARKETS: [&str; 8] = [
    "US",
    "GB",
    "ASIA",
    "EUROPE",
    "RATES",
    "COMMODITIES",
    "CURRENCIES",
    "CRYPTOCURRENCIES",
];

/// Placeholder rendered for keys the upstream did not return.
pub const NOT_AVAILABLE: &str = "N/A";

/// Look up `key` in an upstream object, falling back to `"N/A"` when absent.
///
/// A key that is present with a `null` value stays `null`.
pub fn field_or_na(map: &Map<String, Value>, key: &str) -> Value {
    map.get(key)
        .cloned()
        .unwrap_or_else(|| Value::String(String::from(NOT_AVAILABLE)))
}

/// One OHLCV row of a price history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// `YYYY-MM-DD` in the exchange's local offset.
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Price history for a symbol over a period at an interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    pub symbol: Symbol,
    pub period: Period,
    pub interval: Interval,
    #[serde(rename = "data")]
    pub bars: Vec<Bar>,
}

impl PriceHistory {
    pub fn new(symbol: Symbol, period: Period, interval: Interval, bars: Vec<Bar>) -> Self {
        Self {
            symbol,
            period,
            interval,
            bars,
        }
    }
}

/// Flattened ticker metadata keyed by upstream field name (`longName`, `trailingPE`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TickerInfo(pub Map<String, Value>);

impl TickerInfo {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn field_or_na(&self, key: &str) -> Value {
        field_or_na(&self.0, key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One quote returned by the search endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchQuote(pub Map<String, Value>);

impl SearchQuote {
    pub fn field_or_na(&self, key: &str) -> Value {
        field_or_na(&self.0, key)
    }
}

/// Market trading status plus per-exchange summary quotes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub status: Value,
    pub summary: Map<String, Value>,
}

/// Financial statement families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    IncomeStatement,
    BalanceSheet,
    CashFlow,
}

impl StatementKind {
    pub const ALL: [Self; 3] = [Self::IncomeStatement, Self::BalanceSheet, Self::CashFlow];

    /// Line items requested from the fundamentals time-series endpoint.
    pub const fn line_items(self) -> &'static [&'static str] {
        match self {
            Self::IncomeStatement => &[
                "TotalRevenue",
                "OperatingRevenue",
                "CostOfRevenue",
                "GrossProfit",
                "OperatingExpense",
                "SellingGeneralAndAdministration",
                "ResearchAndDevelopment",
                "OperatingIncome",
                "InterestExpense",
                "InterestIncome",
                "PretaxIncome",
                "TaxProvision",
                "NetIncome",
                "NetIncomeCommonStockholders",
                "BasicEPS",
                "DilutedEPS",
                "BasicAverageShares",
                "DilutedAverageShares",
                "EBIT",
                "EBITDA",
                "NormalizedIncome",
                "TotalExpenses",
            ],
            Self::BalanceSheet => &[
                "TotalAssets",
                "CurrentAssets",
                "CashAndCashEquivalents",
                "CashCashEquivalentsAndShortTermInvestments",
                "Receivables",
                "Inventory",
                "TotalNonCurrentAssets",
                "NetPPE",
                "Goodwill",
                "TotalLiabilitiesNetMinorityInterest",
                "CurrentLiabilities",
                "AccountsPayable",
                "CurrentDebt",
                "LongTermDebt",
                "TotalDebt",
                "NetDebt",
                "StockholdersEquity",
                "RetainedEarnings",
                "CommonStock",
                "WorkingCapital",
                "TangibleBookValue",
                "OrdinarySharesNumber",
            ],
            Self::CashFlow => &[
                "OperatingCashFlow",
                "InvestingCashFlow",
                "FinancingCashFlow",
                "FreeCashFlow",
                "CapitalExpenditure",
                "EndCashPosition",
                "BeginningCashPosition",
                "ChangesInCash",
                "DepreciationAndAmortization",
                "StockBasedCompensation",
                "ChangeInWorkingCapital",
                "CashDividendsPaid",
                "RepurchaseOfCapitalStock",
                "IssuanceOfDebt",
                "RepaymentOfDebt",
                "NetIncomeFromContinuingOperations",
            ],
        }
    }
}

/// A statement rendered as `[{ "item": name, "<date>": value | null, ... }]`.
///
/// Columns are report dates, newest first. Every row carries every column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementTable {
    columns: Vec<String>,
    rows: Vec<StatementRow>,
}

#[derive(Debug, Clone, PartialEq)]
struct StatementRow {
    item: String,
    values: Vec<Option<f64>>,
}

impl StatementTable {
    /// Build a table from `(item, date, value)` cells.
    ///
    /// Rows keep the order of first appearance; non-finite values become `None`.
    pub fn from_cells<I>(cells: I) -> Self
    where
        I: IntoIterator<Item = (String, String, Option<f64>)>,
    {
        let cells = cells.into_iter().collect::<Vec<_>>();

        let mut columns = cells
            .iter()
            .map(|(_, date, _)| date.clone())
            .collect::<Vec<_>>();
        columns.sort_unstable_by(|a, b| b.cmp(a));
        columns.dedup();

        let mut rows: Vec<StatementRow> = Vec::new();
        for (item, date, value) in cells {
            let Some(column) = columns.iter().position(|existing| *existing == date) else {
                continue;
            };
            let index = match rows.iter().position(|row| row.item == item) {
                Some(index) => index,
                None => {
                    rows.push(StatementRow {
                        item,
                        values: vec![None; columns.len()],
                    });
                    rows.len() - 1
                }
            };
            rows[index].values[column] = value.filter(|v| v.is_finite());
        }

        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn items(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|row| row.item.as_str())
    }

    /// Value of `item` at report `date`, if both exist and the cell is populated.
    pub fn value(&self, item: &str, date: &str) -> Option<f64> {
        let column = self.columns.iter().position(|c| c == date)?;
        let row = self.rows.iter().find(|row| row.item == item)?;
        row.values[column]
    }
}

impl Serialize for StatementTable {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        struct RowView<'a> {
            columns: &'a [String],
            row: &'a StatementRow,
        }

        impl Serialize for RowView<'_> {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                let mut map = serializer.serialize_map(Some(self.columns.len() + 1))?;
                map.serialize_entry("item", &self.row.item)?;
                for (column, value) in self.columns.iter().zip(&self.row.values) {
                    map.serialize_entry(column, value)?;
                }
                map.end()
            }
        }

        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in &self.rows {
            seq.serialize_element(&RowView {
                columns: &self.columns,
                row,
            })?;
        }
        seq.end()
    }
}

/// The three annual statements for a symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Financials {
    pub income_statement: StatementTable,
    pub balance_sheet: StatementTable,
    pub cash_flow: StatementTable,
}

impl Financials {
    pub fn statement_mut(&mut self, kind: StatementKind) -> &mut StatementTable {
        match kind {
            StatementKind::IncomeStatement => &mut self.income_statement,
            StatementKind::BalanceSheet => &mut self.balance_sheet,
            StatementKind::CashFlow => &mut self.cash_flow,
        }
    }
}
