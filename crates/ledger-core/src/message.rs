use crate::{error::Result, Block, Transaction};
use serde::{Deserialize, Serialize};

/// Payloads exchanged between nodes, tagged by `type`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Full chain snapshot.
    Blockchain { chain: Vec<Block> },
    /// One freshly mined block.
    Block { block: Block },
    Transaction { transaction: Transaction },
    GetBlockchain,
    /// A transfer entered a miner's pending pool.
    NewTransaction { transaction: Transaction },
}

impl Message {
    /// Decodes a payload; anything missing or ill-typed is `MalformedInput`.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Message::Blockchain { .. } => "BLOCKCHAIN",
            Message::Block { .. } => "BLOCK",
            Message::Transaction { .. } => "TRANSACTION",
            Message::GetBlockchain => "GET_BLOCKCHAIN",
            Message::NewTransaction { .. } => "NEW_TRANSACTION",
        }
    }
}

/// Outward sink for a node's own updates. Fire-and-forget: implementations
/// must not block and do not report delivery.
pub trait Broadcaster: Send + Sync {
    fn broadcast(&self, message: Message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{chain::genesis_block, LedgerError};

    #[test]
    fn request_payload_shape() {
        assert_eq!(
            Message::GetBlockchain.to_json().unwrap(),
            r#"{"type":"GET_BLOCKCHAIN"}"#
        );
        assert_eq!(
            Message::from_json(r#"{"type":"GET_BLOCKCHAIN"}"#).unwrap(),
            Message::GetBlockchain
        );
    }

    #[test]
    fn chain_payload_shape() {
        let msg = Message::Blockchain {
            chain: vec![genesis_block()],
        };
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "BLOCKCHAIN");
        assert_eq!(value["chain"][0]["previousHash"], "0");
        assert_eq!(value["chain"][0]["timestamp"], 1_726_975_000_000u64);
    }

    #[test]
    fn transaction_payload_from_peer() {
        let msg = Message::from_json(
            r#"{"type":"TRANSACTION","transaction":{"from":"a","to":"b","amount":5}}"#,
        )
        .unwrap();
        assert_eq!(msg.kind(), "TRANSACTION");
        let Message::Transaction { transaction } = msg else {
            panic!("wrong variant");
        };
        assert_eq!(transaction.from.as_deref(), Some("a"));
    }

    #[test]
    fn missing_fields_are_malformed() {
        let err = Message::from_json(r#"{"type":"TRANSACTION","transaction":{"from":"a"}}"#)
            .unwrap_err();
        assert!(matches!(err, LedgerError::MalformedInput(_)));
        let err = Message::from_json(r#"{"type":"BLOCK","block":{"index":"1"}}"#).unwrap_err();
        assert!(matches!(err, LedgerError::MalformedInput(_)));
        assert!(Message::from_json(r#"{"type":"ACTIVE_MINERS_UPDATE","count":2}"#).is_err());
    }
}
