//! Identifier derivation rules
//!
//! Source rows do not carry the target's identifier columns directly. Each
//! identifier column is derived by a named rule: a pure function from one
//! row to one scalar. Rules are chosen per column in the configuration and
//! custom ones can be registered on a `RuleSet` at runtime.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{ReconError, ReconResult, RuleError};
use crate::table::{scalar_to_string, RowView};

/// Second and third characters of a precious-metal symbol
const PRECIOUS_METALS: [&str; 4] = ["AU", "AG", "PT", "PD"];

/// Venue event codes and their booking equivalents
const EVENT_TYPE_CODES: [(&str, &str); 6] = [
    ("NEW", "NEWO"),
    ("CONFIRMED", "CONF"),
    ("CANCELLED", "CAMO"),
    ("REJECTED", "REMO"),
    ("TRADE", "FILL"),
    ("TRADE_ACK", "PARF"),
];

/// A pure derivation from one row to one value
pub trait Rule: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    fn evaluate(&self, row: &RowView<'_>) -> Result<Value, RuleError>;
}

/// Built-in rule selection, as written in the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleConfig {
    OrderIntId,
    BuySellIndicator,
    EventType,
    /// Copy a field unchanged. Defaults to the identifier column's own name.
    Passthrough {
        #[serde(default)]
        field: Option<String>,
    },
    InstrumentId,
}

impl RuleConfig {
    /// Instantiate the rule for a given identifier column
    pub fn build(&self, column: &str) -> Box<dyn Rule> {
        match self {
            RuleConfig::OrderIntId => Box::new(OrderIntIdRule),
            RuleConfig::BuySellIndicator => Box::new(BuySellIndicatorRule),
            RuleConfig::EventType => Box::new(EventTypeRule),
            RuleConfig::Passthrough { field } => Box::new(PassthroughRule {
                field: field.clone().unwrap_or_else(|| column.to_string()),
            }),
            RuleConfig::InstrumentId => Box::new(InstrumentIdRule),
        }
    }
}

/// Rules keyed by identifier column
#[derive(Default)]
pub struct RuleSet {
    rules: HashMap<String, Box<dyn Rule>>,
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self
            .rules
            .iter()
            .map(|(column, rule)| (column.as_str(), rule.name()))
            .collect();
        names.sort();
        f.debug_struct("RuleSet").field("rules", &names).finish()
    }
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the rule set described by a mapping's `rules` section
    pub fn from_config(config: &BTreeMap<String, RuleConfig>) -> Self {
        let mut set = Self::new();
        for (column, rule) in config {
            set.rules.insert(column.clone(), rule.build(column));
        }
        set
    }

    /// Register (or replace) the rule for a column
    pub fn register(&mut self, column: impl Into<String>, rule: impl Rule + 'static) {
        self.rules.insert(column.into(), Box::new(rule));
    }

    pub fn get(&self, column: &str) -> Option<&dyn Rule> {
        self.rules.get(column).map(|rule| rule.as_ref())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate the rule registered for `column` against one row.
    ///
    /// A field missing from the row is missing from the whole table, so it is
    /// reported as `MissingColumn` rather than as a per-row failure. Rules must
    /// return a scalar; arrays and objects are rejected.
    pub fn evaluate(&self, column: &str, row: &RowView<'_>) -> ReconResult<Value> {
        let rule = self
            .get(column)
            .ok_or_else(|| ReconError::MissingRule(column.to_string()))?;

        let tagged = |source| ReconError::RuleEvaluation {
            column: column.to_string(),
            env: row.env().to_string(),
            row: row.index(),
            source,
        };

        match rule.evaluate(row) {
            Ok(value @ (Value::Array(_) | Value::Object(_))) => Err(tagged(RuleError::InvalidValue {
                field: column.to_string(),
                value: value.to_string(),
                reason: format!("rule '{}' returned a non-scalar value", rule.name()),
            })),
            Ok(value) => Ok(value),
            Err(RuleError::MissingField(field)) => Err(ReconError::MissingColumn {
                env: row.env().to_string(),
                column: field,
            }),
            Err(source) => Err(tagged(source)),
        }
    }
}

fn field<'a>(row: &RowView<'a>, name: &str) -> Result<&'a Value, RuleError> {
    row.get(name)
        .ok_or_else(|| RuleError::MissingField(name.to_string()))
}

/// Field as text; null becomes an empty string
fn text(row: &RowView<'_>, name: &str) -> Result<String, RuleError> {
    field(row, name).map(|v| scalar_to_string(v).unwrap_or_default())
}

fn integer(row: &RowView<'_>, name: &str) -> Result<i64, RuleError> {
    let value = field(row, name)?;
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    parsed.ok_or_else(|| RuleError::InvalidValue {
        field: name.to_string(),
        value: value.to_string(),
        reason: "expected an integer".to_string(),
    })
}

fn is_false(value: &Value) -> bool {
    match value {
        Value::Bool(b) => !b,
        Value::String(s) => s.eq_ignore_ascii_case("false"),
        _ => false,
    }
}

fn is_precious_metal(sym: &str) -> bool {
    let code: String = sym.chars().skip(1).take(2).collect();
    PRECIOUS_METALS.contains(&code.as_str())
}

/// Internal order id: `orderId`, extended with leg or block details
#[derive(Debug, Clone, Copy)]
pub struct OrderIntIdRule;

impl Rule for OrderIntIdRule {
    fn name(&self) -> &str {
        "order_int_id"
    }

    fn evaluate(&self, row: &RowView<'_>) -> Result<Value, RuleError> {
        let order_id = text(row, "orderId")?;

        let id = match text(row, "instrumentType")?.as_str() {
            "SWAP" => format!("{}_{}", order_id, integer(row, "legId")? + 1),
            "BLOCK" => {
                let buy_leg = text(row, "blockLegSide")? == "BUY";
                let inverted = is_false(field(row, "directionMatchesRequest")?);
                let side = if buy_leg != inverted { "b" } else { "s" };
                [
                    order_id,
                    side.to_string(),
                    text(row, "legId")?,
                    text(row, "allocationId")?,
                    text(row, "quoteId")?,
                ]
                .join("_")
            }
            _ => order_id,
        };

        Ok(Value::String(id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CurrencyOrder {
    Left,
    Right,
    Equal,
}

/// Compare the two three-letter halves of a currency pair character by character
fn currency_order(sym: &[char]) -> CurrencyOrder {
    for i in 0..3 {
        match sym[i].cmp(&sym[i + 3]) {
            std::cmp::Ordering::Less => return CurrencyOrder::Left,
            std::cmp::Ordering::Greater => return CurrencyOrder::Right,
            std::cmp::Ordering::Equal => {}
        }
    }
    CurrencyOrder::Equal
}

/// Booking-side buy/sell indicator, flipped according to quoting convention
#[derive(Debug, Clone, Copy)]
pub struct BuySellIndicatorRule;

impl Rule for BuySellIndicatorRule {
    fn name(&self) -> &str {
        "buy_sell_indicator"
    }

    fn evaluate(&self, row: &RowView<'_>) -> Result<Value, RuleError> {
        let sym = text(row, "sym")?;
        let chars: Vec<char> = sym.chars().collect();
        if chars.len() < 6 {
            return Err(RuleError::InvalidValue {
                field: "sym".to_string(),
                value: sym,
                reason: "expected a six character currency pair".to_string(),
            });
        }

        let mut flip = if is_precious_metal(&sym) {
            true
        } else {
            let unit = text(row, "quantityUnit")?;
            match currency_order(&chars) {
                CurrencyOrder::Left => unit == "BASE",
                CurrencyOrder::Right => unit == "COUNTER",
                CurrencyOrder::Equal => false,
            }
        };

        if text(row, "instrumentType")? == "SWAP" && integer(row, "legId")?.rem_euclid(2) == 0 {
            flip = !flip;
        }

        let side = match text(row, "side")?.as_str() {
            "BUY" if flip => "SELL",
            "BUY" => "BUYI",
            // A flipped SELL books as a buy, the inverse of BUY -> SELL
            "SELL" if flip => "BUYI",
            "SELL" => "SELL",
            _ => "",
        };

        Ok(Value::String(side.to_string()))
    }
}

/// Map venue event codes to booking codes; unknown codes become empty
#[derive(Debug, Clone, Copy)]
pub struct EventTypeRule;

impl Rule for EventTypeRule {
    fn name(&self) -> &str {
        "event_type"
    }

    fn evaluate(&self, row: &RowView<'_>) -> Result<Value, RuleError> {
        let code = text(row, "eventType")?;
        let mapped = EVENT_TYPE_CODES
            .iter()
            .find(|(from, _)| *from == code)
            .map(|(_, to)| *to)
            .unwrap_or("");
        Ok(Value::String(mapped.to_string()))
    }
}

/// Copy one field unchanged
#[derive(Debug, Clone)]
pub struct PassthroughRule {
    pub field: String,
}

impl Rule for PassthroughRule {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn evaluate(&self, row: &RowView<'_>) -> Result<Value, RuleError> {
        field(row, &self.field).cloned()
    }
}

/// Instrument identifier: asset class, `SPOT`, symbol and settlement date
#[derive(Debug, Clone, Copy)]
pub struct InstrumentIdRule;

impl Rule for InstrumentIdRule {
    fn name(&self) -> &str {
        "instrument_id"
    }

    fn evaluate(&self, row: &RowView<'_>) -> Result<Value, RuleError> {
        let sym = text(row, "sym")?;
        let (class, symbol) = if is_precious_metal(&sym) {
            ("PM", format!("X{}", sym.chars().skip(1).collect::<String>()))
        } else {
            ("FX", sym)
        };

        let spot = text(row, "spotSettlementDate")?;
        let settlement = if spot.is_empty() {
            text(row, "legSettlementDate")?
        } else {
            spot
        };

        Ok(Value::String(format!(
            "{}SPOT{}{}",
            class,
            symbol,
            settlement.replace('.', "")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;
    use serde_json::json;

    fn single_row(columns: Vec<&str>, values: Vec<Value>) -> Table {
        Table::from_rows("efx", columns, vec![values]).unwrap()
    }

    fn fx_row(sym: &str, side: &str, unit: &str, instrument_type: &str, leg_id: i64) -> Table {
        single_row(
            vec!["sym", "side", "quantityUnit", "instrumentType", "legId"],
            vec![json!(sym), json!(side), json!(unit), json!(instrument_type), json!(leg_id)],
        )
    }

    #[test]
    fn test_order_int_id_swap() {
        let table = single_row(
            vec!["orderId", "legId", "instrumentType", "datetime"],
            vec![json!(1), json!(0), json!("SWAP"), json!("T1")],
        );
        let value = OrderIntIdRule.evaluate(&table.row(0)).unwrap();
        assert_eq!(value, json!("1_1"));
    }

    #[test]
    fn test_order_int_id_block() {
        let columns = vec![
            "orderId",
            "instrumentType",
            "blockLegSide",
            "directionMatchesRequest",
            "legId",
            "allocationId",
            "quoteId",
        ];
        let table = Table::from_rows(
            "efx",
            columns,
            vec![
                vec![json!(7), json!("BLOCK"), json!("BUY"), json!("true"), json!(2), json!("A9"), json!("Q1")],
                vec![json!(7), json!("BLOCK"), json!("BUY"), json!(false), json!(2), json!("A9"), json!("Q1")],
                vec![json!(7), json!("BLOCK"), json!("SELL"), json!("false"), json!(2), json!("A9"), json!("Q1")],
            ],
        )
        .unwrap();

        assert_eq!(OrderIntIdRule.evaluate(&table.row(0)).unwrap(), json!("7_b_2_A9_Q1"));
        assert_eq!(OrderIntIdRule.evaluate(&table.row(1)).unwrap(), json!("7_s_2_A9_Q1"));
        assert_eq!(OrderIntIdRule.evaluate(&table.row(2)).unwrap(), json!("7_b_2_A9_Q1"));
    }

    #[test]
    fn test_order_int_id_plain_and_missing_field() {
        let table = single_row(vec!["orderId", "instrumentType"], vec![json!(42), json!("SPOT")]);
        assert_eq!(OrderIntIdRule.evaluate(&table.row(0)).unwrap(), json!("42"));

        let table = single_row(vec!["orderId"], vec![json!(42)]);
        let err = OrderIntIdRule.evaluate(&table.row(0)).unwrap_err();
        assert_eq!(err, RuleError::MissingField("instrumentType".to_string()));
    }

    #[test]
    fn test_buy_sell_indicator_fx() {
        // EUR < USD: left ordered, BASE quantity flips
        let table = fx_row("EURUSD", "BUY", "BASE", "SPOT", 0);
        assert_eq!(BuySellIndicatorRule.evaluate(&table.row(0)).unwrap(), json!("SELL"));

        let table = fx_row("EURUSD", "BUY", "COUNTER", "SPOT", 0);
        assert_eq!(BuySellIndicatorRule.evaluate(&table.row(0)).unwrap(), json!("BUYI"));

        // USD > CHF: right ordered, COUNTER quantity flips
        let table = fx_row("USDCHF", "SELL", "COUNTER", "SPOT", 0);
        assert_eq!(BuySellIndicatorRule.evaluate(&table.row(0)).unwrap(), json!("BUYI"));
    }

    #[test]
    fn test_flipped_sell_becomes_buyi() {
        // Mirrors BUY -> SELL
        for sym in ["EURUSD", "XAUUSD"] {
            let table = fx_row(sym, "SELL", "BASE", "SPOT", 0);
            assert_eq!(BuySellIndicatorRule.evaluate(&table.row(0)).unwrap(), json!("BUYI"));
        }
    }

    #[test]
    fn test_buy_sell_indicator_swap_legs() {
        // Even legs invert the flip, odd legs keep it
        let table = fx_row("EURUSD", "BUY", "BASE", "SWAP", 0);
        assert_eq!(BuySellIndicatorRule.evaluate(&table.row(0)).unwrap(), json!("BUYI"));

        let table = fx_row("EURUSD", "BUY", "BASE", "SWAP", 1);
        assert_eq!(BuySellIndicatorRule.evaluate(&table.row(0)).unwrap(), json!("SELL"));
    }

    #[test]
    fn test_buy_sell_indicator_precious_metal_always_flips() {
        let table = fx_row("XAUUSD", "SELL", "COUNTER", "SPOT", 0);
        assert_eq!(BuySellIndicatorRule.evaluate(&table.row(0)).unwrap(), json!("BUYI"));

        let table = fx_row("XAGUSD", "HOLD", "BASE", "SPOT", 0);
        assert_eq!(BuySellIndicatorRule.evaluate(&table.row(0)).unwrap(), json!(""));
    }

    #[test]
    fn test_buy_sell_indicator_short_symbol() {
        let table = fx_row("EUR", "BUY", "BASE", "SPOT", 0);
        let err = BuySellIndicatorRule.evaluate(&table.row(0)).unwrap_err();
        assert!(matches!(err, RuleError::InvalidValue { field, .. } if field == "sym"));
    }

    #[test]
    fn test_event_type_mapping() {
        let table = Table::from_rows(
            "efx",
            vec!["eventType"],
            vec![vec![json!("TRADE_ACK")], vec![json!("AMENDED")]],
        )
        .unwrap();
        assert_eq!(EventTypeRule.evaluate(&table.row(0)).unwrap(), json!("PARF"));
        assert_eq!(EventTypeRule.evaluate(&table.row(1)).unwrap(), json!(""));
    }

    #[test]
    fn test_instrument_id() {
        let columns = vec!["sym", "spotSettlementDate", "legSettlementDate"];
        let table = Table::from_rows(
            "efx",
            columns,
            vec![
                vec![json!("EURUSD"), json!("2024.01.05"), json!("2024.02.05")],
                vec![json!("XAUUSD"), Value::Null, json!("2024.02.05")],
                vec![json!("XPTUSD"), json!(""), json!("2024.03.01")],
            ],
        )
        .unwrap();

        assert_eq!(InstrumentIdRule.evaluate(&table.row(0)).unwrap(), json!("FXSPOTEURUSD20240105"));
        assert_eq!(InstrumentIdRule.evaluate(&table.row(1)).unwrap(), json!("PMSPOTXAUUSD20240205"));
        assert_eq!(InstrumentIdRule.evaluate(&table.row(2)).unwrap(), json!("PMSPOTXPTUSD20240301"));
    }

    #[test]
    fn test_rule_set_from_config() {
        let yaml = r#"
orderIntId: { kind: order_int_id }
datetime: { kind: passthrough }
tradeTime: { kind: passthrough, field: datetime }
"#;
        let config: BTreeMap<String, RuleConfig> = serde_yaml::from_str(yaml).unwrap();
        let rules = RuleSet::from_config(&config);
        assert_eq!(rules.len(), 3);

        let table = single_row(vec!["datetime"], vec![json!("T1")]);
        assert_eq!(rules.evaluate("datetime", &table.row(0)).unwrap(), json!("T1"));
        assert_eq!(rules.evaluate("tradeTime", &table.row(0)).unwrap(), json!("T1"));
    }

    #[test]
    fn test_rule_set_errors_are_tagged() {
        let mut rules = RuleSet::new();
        rules.register("orderIntId", OrderIntIdRule);
        let table = single_row(
            vec!["orderId", "instrumentType", "legId"],
            vec![json!(5), json!("SWAP"), json!("abc")],
        );

        let err = rules.evaluate("orderIntId", &table.row(0)).unwrap_err();
        match err {
            ReconError::RuleEvaluation { column, env, row, source } => {
                assert_eq!(column, "orderIntId");
                assert_eq!(env, "efx");
                assert_eq!(row, 0);
                assert!(matches!(source, RuleError::InvalidValue { field, .. } if field == "legId"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = rules.evaluate("instrumentId", &table.row(0)).unwrap_err();
        assert!(matches!(err, ReconError::MissingRule(column) if column == "instrumentId"));
    }

    #[test]
    fn test_missing_field_reported_as_missing_column() {
        let mut rules = RuleSet::new();
        rules.register("eventType", EventTypeRule);
        let table = single_row(vec!["datetime"], vec![json!("T1")]);

        let err = rules.evaluate("eventType", &table.row(0)).unwrap_err();
        assert!(matches!(
            err,
            ReconError::MissingColumn { env, column } if env == "efx" && column == "eventType"
        ));
    }

    #[test]
    fn test_non_scalar_rule_result_rejected() {
        struct Legs;
        impl Rule for Legs {
            fn name(&self) -> &str {
                "legs"
            }
            fn evaluate(&self, _row: &RowView<'_>) -> Result<Value, RuleError> {
                Ok(json!(["1", "2"]))
            }
        }

        let mut rules = RuleSet::new();
        rules.register("orderIntId", Legs);
        let table = single_row(vec!["orderId"], vec![json!(1)]);

        let err = rules.evaluate("orderIntId", &table.row(0)).unwrap_err();
        match err {
            ReconError::RuleEvaluation { column, row, source, .. } => {
                assert_eq!(column, "orderIntId");
                assert_eq!(row, 0);
                assert!(matches!(source, RuleError::InvalidValue { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_custom_rule_registration() {
        struct Upper;
        impl Rule for Upper {
            fn name(&self) -> &str {
                "upper"
            }
            fn evaluate(&self, row: &RowView<'_>) -> Result<Value, RuleError> {
                Ok(Value::String(text(row, "side")?.to_uppercase()))
            }
        }

        let mut rules = RuleSet::new();
        rules.register("buySellIndicator", Upper);
        let table = single_row(vec!["side"], vec![json!("buy")]);
        assert_eq!(rules.evaluate("buySellIndicator", &table.row(0)).unwrap(), json!("BUY"));
    }
}
