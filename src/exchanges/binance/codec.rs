use super::types::{BinanceAccountPosition, BinanceBalanceUpdate, BinanceExecutionReport};
use crate::core::errors::ExchangeError;
use crate::core::kernel::{Decoded, WsCodec};
use crate::core::types::{
    timestamp_from_millis, AccountPosition, AssetBalance, BalanceUpdate, EventHeader, ExchangeId,
    ExecutionReport, StreamEvent,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Codec for the Binance spot user-data stream
///
/// The stream is bound to the listen key in the URL, so nothing is ever
/// subscribed. Frames are routed on the `"e"` event-type field.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinanceUserCodec;

impl WsCodec for BinanceUserCodec {
    fn encode_subscription(&self, _topics: &[String]) -> Result<Vec<String>, ExchangeError> {
        Ok(Vec::new())
    }

    fn decode_message(&self, text: &str) -> Result<Decoded, ExchangeError> {
        let value: Value = serde_json::from_str(text)?;
        let event_type = value
            .get("e")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| ExchangeError::ParseError("Missing event type field 'e'".to_string()))?;

        match event_type.as_str() {
            "executionReport" => {
                let report: BinanceExecutionReport = parse_payload(value, &event_type)?;
                Ok(Decoded::Event(StreamEvent::ExecutionReport(
                    convert_execution_report(report),
                )))
            }
            "balanceUpdate" => {
                let update: BinanceBalanceUpdate = parse_payload(value, &event_type)?;
                Ok(Decoded::Event(StreamEvent::BalanceUpdate(
                    convert_balance_update(update),
                )))
            }
            "outboundAccountPosition" => {
                let position: BinanceAccountPosition = parse_payload(value, &event_type)?;
                Ok(Decoded::Event(StreamEvent::AccountPosition(
                    convert_account_position(position),
                )))
            }
            other => Ok(Decoded::Unknown(other.to_string())),
        }
    }
}

fn parse_payload<T: DeserializeOwned>(value: Value, event_type: &str) -> Result<T, ExchangeError> {
    serde_json::from_value(value)
        .map_err(|e| ExchangeError::ParseError(format!("Failed to parse {}: {}", event_type, e)))
}

pub fn convert_execution_report(report: BinanceExecutionReport) -> ExecutionReport {
    ExecutionReport {
        header: EventHeader::from_millis(ExchangeId::Binance, report.symbol, report.event_time),
        client_order_id: report.client_order_id,
        order_id: report.order_id,
        side: report.side,
        order_type: report.order_type,
        execution_type: report.execution_type,
        order_status: report.order_status,
        price: report.price,
        quantity: report.quantity,
        last_filled_quantity: report.last_filled_quantity,
        last_filled_price: report.last_filled_price,
        cumulative_filled_quantity: report.cumulative_filled_quantity,
        commission: report.commission,
        commission_asset: report.commission_asset,
    }
}

pub fn convert_balance_update(update: BinanceBalanceUpdate) -> BalanceUpdate {
    BalanceUpdate {
        clear_time: timestamp_from_millis(update.clear_time),
        header: EventHeader::from_millis(ExchangeId::Binance, update.asset, update.event_time),
        delta: update.delta,
    }
}

/// Account-wide snapshot; the header symbol is left empty
pub fn convert_account_position(position: BinanceAccountPosition) -> AccountPosition {
    AccountPosition {
        header: EventHeader::from_millis(ExchangeId::Binance, "", position.event_time),
        last_update: timestamp_from_millis(position.last_update),
        balances: position
            .balances
            .into_iter()
            .map(|b| AssetBalance {
                asset: b.asset,
                free: b.free,
                locked: b.locked,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    const EXECUTION_REPORT: &str = r#"{
        "e": "executionReport", "E": 1499405658658, "s": "ETHBTC",
        "c": "mUvoqJxFIILMdfAW5iGSOW", "S": "BUY", "o": "LIMIT", "f": "GTC",
        "q": "1.00000000", "p": "0.10264410", "P": "0.00000000", "F": "0.00000000",
        "g": -1, "C": "", "x": "TRADE", "X": "PARTIALLY_FILLED", "r": "NONE",
        "i": 4293153, "l": "0.40000000", "z": "0.40000000", "L": "0.10264400",
        "n": "0.00004000", "N": "BNB", "T": 1499405658657, "t": 12, "I": 8641984,
        "w": true, "m": false, "M": false, "O": 1499405658657,
        "Z": "0.04105760", "Y": "0.04105760", "Q": "0.00000000"
    }"#;

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    #[test]
    fn test_decode_execution_report() {
        let decoded = BinanceUserCodec.decode_message(EXECUTION_REPORT).unwrap();
        let Decoded::Event(StreamEvent::ExecutionReport(report)) = decoded else {
            panic!("expected an execution report, got {:?}", decoded);
        };

        assert_eq!(report.header.exchange, ExchangeId::Binance);
        assert_eq!(report.header.symbol, "ETHBTC");
        assert_eq!(report.header.timestamp.timestamp_millis(), 1_499_405_658_658);
        assert_eq!(report.order_id, 4_293_153);
        assert_eq!(report.execution_type, "TRADE");
        assert_eq!(report.order_status, "PARTIALLY_FILLED");
        assert_eq!(report.price, dec("0.10264410"));
        assert_eq!(report.last_filled_quantity, dec("0.4"));
        assert_eq!(report.commission_asset.as_deref(), Some("BNB"));
    }

    #[test]
    fn test_decode_execution_report_without_commission_asset() {
        let text = EXECUTION_REPORT.replace(r#""N": "BNB""#, r#""N": null"#);
        let decoded = BinanceUserCodec.decode_message(&text).unwrap();
        let Decoded::Event(StreamEvent::ExecutionReport(report)) = decoded else {
            panic!("expected an execution report");
        };
        assert!(report.commission_asset.is_none());
    }

    #[test]
    fn test_decode_balance_update() {
        let text = r#"{"e":"balanceUpdate","E":1573200697110,"a":"BTC","d":"100.00000000","T":1573200697068}"#;
        let decoded = BinanceUserCodec.decode_message(text).unwrap();
        let Decoded::Event(StreamEvent::BalanceUpdate(update)) = decoded else {
            panic!("expected a balance update");
        };
        assert_eq!(update.header.symbol, "BTC");
        assert_eq!(update.delta, dec("100"));
        assert_eq!(update.clear_time.timestamp_millis(), 1_573_200_697_068);
    }

    #[test]
    fn test_decode_account_position() {
        let text = r#"{
            "e": "outboundAccountPosition", "E": 1564034571105, "u": 1564034571073,
            "B": [{"a": "ETH", "f": "10000.000000", "l": "0.000000"},
                  {"a": "BTC", "f": "0.5", "l": "0.25"}]
        }"#;
        let decoded = BinanceUserCodec.decode_message(text).unwrap();
        let Decoded::Event(StreamEvent::AccountPosition(position)) = decoded else {
            panic!("expected an account position");
        };
        assert_eq!(position.balances.len(), 2);
        assert_eq!(position.balances[1].asset, "BTC");
        assert_eq!(position.balances[1].locked, dec("0.25"));
        assert_eq!(position.last_update.timestamp_millis(), 1_564_034_571_073);
    }

    #[test]
    fn test_unknown_event_type_is_not_an_error() {
        let decoded = BinanceUserCodec
            .decode_message(r#"{"e":"listStatus","E":1}"#)
            .unwrap();
        assert_eq!(decoded, Decoded::Unknown("listStatus".to_string()));
    }

    #[test]
    fn test_malformed_frames_are_parse_errors() {
        assert!(matches!(
            BinanceUserCodec.decode_message("not json"),
            Err(ExchangeError::ParseError(_))
        ));
        assert!(matches!(
            BinanceUserCodec.decode_message(r#"{"result":null,"id":1}"#),
            Err(ExchangeError::ParseError(_))
        ));
        assert!(matches!(
            BinanceUserCodec.decode_message(r#"{"e":"balanceUpdate","E":1,"a":"BTC"}"#),
            Err(ExchangeError::ParseError(_))
        ));
    }

    #[test]
    fn test_payload_error_names_event_type() {
        let err = BinanceUserCodec
            .decode_message(r#"{"e":"executionReport","E":1,"s":"BTCUSDT"}"#)
            .unwrap_err();
        let ExchangeError::ParseError(reason) = &err else {
            panic!("expected a parse error, got {:?}", err);
        };
        assert!(reason.starts_with("Failed to parse executionReport"));
    }

    #[test]
    fn test_no_subscription_frames() {
        assert!(BinanceUserCodec
            .encode_subscription(&["ignored".to_string()])
            .unwrap()
            .is_empty());
    }
}
