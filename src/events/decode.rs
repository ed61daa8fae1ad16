//! Boundary decoding of raw adapter payloads into typed events

use super::{NativeEvent, PortalEvent};
use crate::error::{PortalError, PortalResult};
use crate::swap::{Invoice, Liquidity, Receipt, Swap};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An event as read off a chain, before validation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    /// Contract event name, e.g. `swapHolderPaid`
    pub event: String,
    #[serde(default)]
    pub block_number: u64,
    /// Event fields
    #[serde(default)]
    pub data: Value,
}

impl RawEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            block_number: 0,
            data,
        }
    }
}

/// Decode a portal chain event
pub fn decode_portal(raw: &RawEvent) -> PortalResult<PortalEvent> {
    let event: PortalEvent = decode_tagged(raw)?;
    match &event {
        PortalEvent::SwapMatched { swap } => check_swap(swap)?,
        PortalEvent::SwapHolderInvoiced { invoice, .. }
        | PortalEvent::SwapSeekerInvoiced { invoice, .. } => check_invoice(invoice)?,
        PortalEvent::AssetMinted { liquidity } | PortalEvent::AssetBurned { liquidity } => {
            check_liquidity(liquidity)?
        }
        PortalEvent::BlockHeight { .. } => {}
    }
    Ok(event)
}

/// Decode a native chain event
pub fn decode_native(raw: &RawEvent) -> PortalResult<NativeEvent> {
    let event: NativeEvent = decode_tagged(raw)?;
    match &event {
        NativeEvent::Deposit { liquidity } | NativeEvent::Withdraw { liquidity } => {
            check_liquidity(liquidity)?
        }
        NativeEvent::SwapHolderPaid { receipt, .. }
        | NativeEvent::SwapSeekerPaid { receipt, .. }
        | NativeEvent::SwapSeekerSettled { receipt, .. } => check_receipt(receipt)?,
        NativeEvent::SwapHolderSettled { secret, receipt, .. } => {
            if secret.is_empty() {
                return Err(PortalError::EventParsing(
                    "swapHolderSettled carries an empty secret".to_string(),
                ));
            }
            if let Some(receipt) = receipt {
                check_receipt(receipt)?;
            }
        }
        NativeEvent::BlockHeight { .. } => {}
    }
    Ok(event)
}

fn decode_tagged<T: DeserializeOwned>(raw: &RawEvent) -> PortalResult<T> {
    let mut fields = match &raw.data {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            return Err(PortalError::EventParsing(format!(
                "{} payload must be an object, got {}",
                raw.event, other
            )))
        }
    };
    fields.insert("event".to_string(), Value::String(raw.event.clone()));

    serde_json::from_value(Value::Object(fields))
        .map_err(|e| PortalError::EventParsing(format!("{}: {}", raw.event, e)))
}

fn check_swap(swap: &Swap) -> PortalResult<()> {
    for party in [&swap.secret_holder, &swap.secret_seeker] {
        if party.portal_address.is_empty() || party.chain.is_empty() {
            return Err(PortalError::EventParsing(format!(
                "swap {} has a party without address or chain",
                swap.id_hex()
            )));
        }
        if party.amount == 0 {
            return Err(PortalError::EventParsing(format!(
                "swap {} has a zero amount",
                swap.id_hex()
            )));
        }
    }
    swap.check_secret()
        .map_err(|e| PortalError::EventParsing(format!("swap {}: {}", swap.id_hex(), e)))
}

fn check_invoice(invoice: &Invoice) -> PortalResult<()> {
    if invoice.id.is_empty() {
        return Err(PortalError::EventParsing("invoice without id".to_string()));
    }
    Ok(())
}

fn check_receipt(receipt: &Receipt) -> PortalResult<()> {
    if receipt.id.is_empty() {
        return Err(PortalError::EventParsing("receipt without id".to_string()));
    }
    Ok(())
}

fn check_liquidity(liquidity: &Liquidity) -> PortalResult<()> {
    if liquidity.amount == 0 {
        return Err(PortalError::EventParsing(format!(
            "{} liquidity event with zero amount",
            liquidity.symbol
        )));
    }
    Ok(())
}
