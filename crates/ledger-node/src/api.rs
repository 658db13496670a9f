use crate::{
    hub::{ws_handler, ClientHub},
    role::NodeRole,
};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ledger_core::{
    constants::FAUCET_AMOUNT,
    ledger::{self, Balance, Issuance},
    mining::MiningState,
    now_millis, Block, LedgerError, Transaction,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{collections::BTreeMap, sync::Arc};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub(crate) struct AppState {
    pub role: Arc<dyn NodeRole>,
    pub hub: ClientHub,
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/blockchain", get(blockchain))
        .route("/chain/head", get(head))
        .route("/balance/{address}", get(balance))
        .route("/balances", get(balances))
        .route("/pending-transactions", get(pending_transactions))
        .route("/transaction", post(submit_transaction))
        .route("/faucet", post(faucet))
        .route("/blockchain-details", get(blockchain_details))
        .route("/mining", get(mining))
        .route("/active-nodes", get(active_nodes))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Ledger(LedgerError),
    NotFound(&'static str),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Ledger(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Ledger(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, what.to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Serialize)]
struct Health {
    status: &'static str,
    role: &'static str,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        role: state.role.name(),
    })
}

#[derive(Serialize)]
struct ChainView {
    chain: Vec<Block>,
    length: usize,
}

async fn blockchain(State(state): State<AppState>) -> Json<ChainView> {
    let chain = state.role.chain().chain();
    Json(ChainView {
        length: chain.len(),
        chain,
    })
}

#[derive(Serialize)]
struct Head {
    height: u64,
    hash: String,
    timestamp: u64,
}

async fn head(State(state): State<AppState>) -> Json<Head> {
    let tip = state.role.chain().tip();
    Json(Head {
        height: tip.index,
        hash: tip.hash,
        timestamp: tip.timestamp,
    })
}

#[derive(Debug, Serialize)]
struct BalanceView {
    address: String,
    balance: Balance,
}

async fn balance(State(state): State<AppState>, Path(address): Path<String>) -> Json<BalanceView> {
    let balance = state.role.chain().balance_of(&address);
    Json(BalanceView { address, balance })
}

/// Every address seen on the chain.
async fn balances(State(state): State<AppState>) -> Json<BTreeMap<String, Balance>> {
    Json(state.role.chain().read(|bc| ledger::balances(bc.chain())))
}

async fn pending_transactions(State(state): State<AppState>) -> Json<Vec<Transaction>> {
    Json(state.role.chain().pending())
}

async fn submit_transaction(State(state): State<AppState>, body: Bytes) -> ApiResult<Value> {
    let mut tx: Transaction = serde_json::from_slice(&body)?;
    if tx.timestamp.is_none() {
        tx.timestamp = Some(now_millis());
    }
    let message = state.role.submit_transaction(tx.clone())?;
    Ok(Json(json!({ "message": message, "transaction": tx })))
}

#[derive(Deserialize)]
struct FaucetRequest {
    address: String,
}

async fn faucet(State(state): State<AppState>, body: Bytes) -> ApiResult<Value> {
    let request: FaucetRequest = serde_json::from_slice(&body)?;
    let grant = state
        .role
        .faucet(&request.address)
        .ok_or(ApiError::NotFound("faucet is served by the coordinator"))??;
    Ok(Json(json!({
        "success": true,
        "message": format!("{FAUCET_AMOUNT} coins ==> {} added in pending transactions", grant.to),
        "transaction": grant,
    })))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BlockchainDetails {
    #[serde(flatten)]
    issuance: Issuance,
    blockchain_length: usize,
    block_reward: u64,
}

async fn blockchain_details(State(state): State<AppState>) -> Json<BlockchainDetails> {
    let chain = state.role.chain();
    Json(BlockchainDetails {
        issuance: chain.issuance(),
        blockchain_length: chain.len(),
        block_reward: chain.params().mining_reward,
    })
}

#[derive(Debug, Serialize)]
struct MiningStatus {
    state: MiningState,
}

#[derive(Serialize)]
struct ActiveNodes {
    count: usize,
}

/// Connected WebSocket peers.
async fn active_nodes(State(state): State<AppState>) -> Json<ActiveNodes> {
    Json(ActiveNodes {
        count: state.hub.client_count(),
    })
}

async fn mining(State(state): State<AppState>) -> ApiResult<MiningStatus> {
    let mining = state
        .role
        .mining_state()
        .ok_or(ApiError::NotFound("this node does not mine"))?;
    Ok(Json(MiningStatus { state: mining }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        coordinator::Coordinator,
        testutil::{mined_chain, test_chain, DIFFICULTY},
    };
    use ledger_core::{
        chain::genesis_block,
        pow::{mine_block, CancelToken},
    };

    fn coordinator_state() -> AppState {
        let hub = ClientHub::new();
        let chain = test_chain();
        chain.replace_chain(mined_chain(2, "alice")).unwrap();
        AppState {
            role: Arc::new(Coordinator::new(chain, hub.clone())),
            hub,
        }
    }

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[tokio::test]
    async fn balance_replays_chain() {
        let Json(view) = balance(State(coordinator_state()), Path("alice".into())).await;
        assert_eq!(view.address, "alice");
        assert_eq!(view.balance, 20);
        assert_eq!(
            serde_json::to_value(&view).unwrap(),
            json!({ "address": "alice", "balance": 20 })
        );
    }

    #[tokio::test]
    async fn balance_above_u64_range_is_served() {
        let chain = test_chain();
        let genesis = genesis_block();
        let block = mine_block(
            Block::new(
                1,
                genesis.timestamp + 10_000,
                vec![Transaction::mint("a", u64::MAX), Transaction::mint("a", u64::MAX)],
                genesis.hash.clone(),
            ),
            DIFFICULTY,
            &CancelToken::new(),
        )
        .unwrap();
        chain.replace_chain(vec![genesis, block]).unwrap();
        let hub = ClientHub::new();
        let state = AppState {
            role: Arc::new(Coordinator::new(chain, hub.clone())),
            hub,
        };

        let Json(view) = balance(State(state), Path("a".into())).await;
        let expected = 2 * u64::MAX as Balance;
        assert_eq!(view.balance, expected);
        let body = serde_json::to_string(&view).unwrap();
        assert!(body.contains(&expected.to_string()));
    }

    #[tokio::test]
    async fn balances_list_every_address() {
        let Json(all) = balances(State(coordinator_state())).await;
        assert_eq!(all.get("alice"), Some(&20));
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn active_nodes_counts_connected_clients() {
        let state = coordinator_state();
        let _client = state.hub.subscribe();
        let Json(active) = active_nodes(State(state)).await;
        assert_eq!(active.count, 1);
    }

    #[tokio::test]
    async fn head_reports_tip() {
        let state = coordinator_state();
        let tip = state.role.chain().tip();
        let Json(head) = head(State(state)).await;
        assert_eq!(head.height, 2);
        assert_eq!(head.hash, tip.hash);
    }

    #[tokio::test]
    async fn details_split_rewards() {
        let Json(details) = blockchain_details(State(coordinator_state())).await;
        let value = serde_json::to_value(&details).unwrap();
        assert_eq!(
            value,
            json!({
                "totalFauceted": 0,
                "totalMiningRewards": 20,
                "blockchainLength": 3,
                "blockReward": 10,
            })
        );
    }

    #[tokio::test]
    async fn malformed_transaction_is_bad_request() {
        let err = submit_transaction(
            State(coordinator_state()),
            Bytes::from_static(br#"{"from":"alice","amount":"ten"}"#),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Ledger(LedgerError::MalformedInput(_))));
        assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn submitted_transaction_gets_a_timestamp() {
        let Json(body) = submit_transaction(
            State(coordinator_state()),
            Bytes::from_static(br#"{"from":"alice","to":"bob","amount":5}"#),
        )
        .await
        .unwrap();
        assert!(body["transaction"]["timestamp"].is_u64());
    }

    #[tokio::test]
    async fn overspend_is_bad_request() {
        let err = submit_transaction(
            State(coordinator_state()),
            Bytes::from_static(br#"{"from":"alice","to":"bob","amount":500}"#),
        )
        .await
        .unwrap_err();
        assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn coordinator_does_not_report_mining() {
        let err = mining(State(coordinator_state())).await.unwrap_err();
        assert_eq!(status_of(err), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn faucet_grants_fixed_amount() {
        let Json(body) = faucet(
            State(coordinator_state()),
            Bytes::from_static(br#"{"address":"dave"}"#),
        )
        .await
        .unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["transaction"]["amount"], FAUCET_AMOUNT);
        assert!(body["transaction"]["from"].is_null());
    }
}
