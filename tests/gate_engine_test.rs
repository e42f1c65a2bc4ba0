use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use token_gate::gate::{
    AccessEngine, AccessState, AssetQuery, ChainReader, ChainReaderRegistry, ConditionExecutor,
    ConditionSpec, ErrorKind, EvaluationCache, EvaluationRequest, GateDecision, Outcome, PageRef,
    PageView, PayloadError, PayloadSource, ProtectedContentGate, ProtectedPayload, ReadError,
};
use token_gate::gate::{Address, U256};

const ACCOUNT: &str = "0x71c7656ec7ab88b098defb751b7401b5f6d8976f";
const WETH: &str = "0x7ceb23fd6bc0add59e62ac25578270cff1b9f619";
const PUNKS: &str = "0xb47e3cd837ddf8e4c57f05d70ab865de6e193bbb";
const SLOW: &str = "0x0000000000000000000000000000000000005104";

#[derive(Clone)]
enum Behavior {
    Balance(&'static str),
    Hang,
    Fail,
}

/// Answers by contract address (or "native"), counting every call.
struct MockReader {
    behaviors: HashMap<Option<Address>, Behavior>,
    calls: AtomicUsize,
    delay: Duration,
}

impl MockReader {
    fn new(entries: &[(&str, Behavior)]) -> Self {
        Self {
            behaviors: entries
                .iter()
                .map(|(k, v)| {
                    let contract = match *k {
                        "native" => None,
                        address => Some(address.parse::<Address>().unwrap()),
                    };
                    (contract, v.clone())
                })
                .collect(),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainReader for MockReader {
    async fn balance_of(&self, query: &AssetQuery) -> Result<U256, ReadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.behaviors.get(&query.contract_address) {
            Some(Behavior::Balance(b)) => Ok(b.parse::<U256>().unwrap()),
            Some(Behavior::Hang) => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(U256::ZERO)
            }
            Some(Behavior::Fail) | None => Err(ReadError::Rpc {
                code: -32000,
                message: "header not found".to_string(),
            }),
        }
    }
}

/// Records whether the payload was ever requested.
struct MockPayloads {
    fetches: AtomicUsize,
}

#[async_trait]
impl PayloadSource for MockPayloads {
    async fn fetch_protected_payload(
        &self,
        page: &PageRef,
    ) -> Result<ProtectedPayload, PayloadError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(ProtectedPayload {
            page: page.clone(),
            body: json!({ "secret": "members only" }),
        })
    }
}

fn engine_with(chain_id: u64, reader: Arc<MockReader>) -> Arc<AccessEngine> {
    let registry = ChainReaderRegistry::new().with_reader(chain_id, reader);
    let executor = ConditionExecutor::new(Arc::new(registry))
        .with_read_timeout(Duration::from_millis(200));
    Arc::new(AccessEngine::new(
        Arc::new(executor),
        Arc::new(EvaluationCache::default()),
    ))
}

fn request(spec: serde_json::Value) -> EvaluationRequest {
    EvaluationRequest::new(
        ACCOUNT.parse::<Address>().unwrap(),
        Arc::new(ConditionSpec::from_value(&spec).unwrap()),
    )
}

fn erc20(contract: &str, amount: &str) -> serde_json::Value {
    json!({
        "chainId": 137,
        "assetType": "ERC20",
        "contractAddress": contract,
        "comparator": "GTE",
        "amount": amount,
        "decimals": 18
    })
}

fn page() -> PageRef {
    PageRef {
        site: "club".to_string(),
        page: "lounge".to_string(),
        slug: None,
    }
}

#[tokio::test]
async fn test_single_erc20_threshold_met() {
    let reader = Arc::new(MockReader::new(&[(WETH, Behavior::Balance("150000000000000000000"))]));
    let engine = engine_with(137, reader.clone());

    let result = engine
        .evaluate(&request(json!({
            "operator": "AND",
            "children": [erc20(WETH, "100000000000000000000")]
        })))
        .await;

    assert!(result.final_result);
    assert_eq!(result.per_condition_result[&0], Outcome::Met);
    assert_eq!(result.balances[&0].to_string(), "150000000000000000000");
    assert!(result.errors.is_empty());
    assert_eq!(reader.calls(), 1);
}

#[tokio::test]
async fn test_and_with_timed_out_read() {
    let reader = Arc::new(MockReader::new(&[
        (WETH, Behavior::Balance("150000000000000000000")),
        (SLOW, Behavior::Hang),
    ]));
    let engine = engine_with(137, reader);

    let result = engine
        .evaluate(&request(json!({
            "operator": "AND",
            "children": [erc20(WETH, "100000000000000000000"), erc20(SLOW, "1")]
        })))
        .await;

    assert!(!result.final_result);
    assert_eq!(result.per_condition_result[&0], Outcome::Met);
    assert_eq!(result.per_condition_result[&1], Outcome::Unknown);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[&1], ErrorKind::RpcFailure);
    assert_eq!(result.balances[&0].to_string(), "150000000000000000000");
    assert!(!result.balances.contains_key(&1));
    assert_eq!(result.access_state(), AccessState::PartiallyUnknown);
}

#[tokio::test]
async fn test_failure_is_isolated_to_its_ordinal() {
    let healthy = Arc::new(MockReader::new(&[
        (WETH, Behavior::Balance("42")),
        (PUNKS, Behavior::Balance("0")),
    ]));
    let flaky = Arc::new(MockReader::new(&[
        (WETH, Behavior::Balance("42")),
        (PUNKS, Behavior::Balance("0")),
        (SLOW, Behavior::Fail),
    ]));
    let conditions = |with_failing: bool| {
        let mut children = vec![erc20(WETH, "10"), erc20(PUNKS, "1")];
        if with_failing {
            children.push(erc20(SLOW, "1"));
        }
        json!({ "operator": "OR", "children": children })
    };

    let baseline = engine_with(137, healthy).evaluate(&request(conditions(false))).await;
    let degraded = engine_with(137, flaky).evaluate(&request(conditions(true))).await;

    for ordinal in [0usize, 1] {
        assert_eq!(
            baseline.per_condition_result[&ordinal],
            degraded.per_condition_result[&ordinal]
        );
        assert_eq!(baseline.balances[&ordinal], degraded.balances[&ordinal]);
    }
    assert_eq!(degraded.errors.keys().copied().collect::<Vec<_>>(), vec![2]);
}

#[tokio::test]
async fn test_or_of_nft_and_token() {
    let reader = Arc::new(MockReader::new(&[
        (PUNKS, Behavior::Balance("0")),
        (WETH, Behavior::Balance("500")),
    ]));
    let engine = engine_with(137, reader);

    let result = engine
        .evaluate(&request(json!({
            "operator": "OR",
            "children": [
                { "chainId": 137, "assetType": "ERC721", "contractAddress": PUNKS },
                erc20(WETH, "100")
            ]
        })))
        .await;

    assert!(result.final_result);
    assert_eq!(result.per_condition_result[&0], Outcome::NotMet);
    assert_eq!(result.per_condition_result[&1], Outcome::Met);
    assert_eq!(result.balances[&0].to_string(), "0");
}

#[tokio::test]
async fn test_all_leaves_read_even_when_first_branch_decides() {
    let reader = Arc::new(MockReader::new(&[
        (WETH, Behavior::Balance("500")),
        (PUNKS, Behavior::Balance("3")),
    ]));
    let engine = engine_with(137, reader.clone());

    let result = engine
        .evaluate(&request(json!({
            "operator": "OR",
            "children": [
                erc20(WETH, "100"),
                { "chainId": 137, "assetType": "ERC721", "contractAddress": PUNKS }
            ]
        })))
        .await;

    assert!(result.final_result);
    assert_eq!(reader.calls(), 2);
    assert_eq!(result.balances.len(), 2);
    assert_eq!(result.per_condition_result[&1], Outcome::Met);
}

#[tokio::test]
async fn test_empty_groups() {
    let reader = Arc::new(MockReader::new(&[]));
    let engine = engine_with(137, reader.clone());

    let and = engine
        .evaluate(&request(json!({ "operator": "AND", "children": [] })))
        .await;
    let or = engine
        .evaluate(&request(json!({ "operator": "OR", "children": [] })))
        .await;

    assert!(and.final_result);
    assert!(!or.final_result);
    assert_eq!(reader.calls(), 0);
}

#[tokio::test]
async fn test_reevaluation_within_ttl_issues_no_reads() {
    let reader = Arc::new(MockReader::new(&[(WETH, Behavior::Balance("150"))]));
    let engine = engine_with(137, reader.clone());
    let req = request(json!({ "operator": "AND", "children": [erc20(WETH, "100")] }));

    let first = engine.evaluate(&req).await;
    let second = engine.evaluate(&req).await;

    assert_eq!(reader.calls(), 1);
    assert!(first.same_content(&second));

    // Explicit retry forces fresh reads.
    let retried = engine.retry(&req).await;
    assert_eq!(reader.calls(), 2);
    assert!(first.same_content(&retried));

    // The retried result is what later renders see.
    assert!(Arc::ptr_eq(&engine.evaluate(&req).await, &retried));

    engine.invalidate(&req).await;
    engine.evaluate(&req).await;
    assert_eq!(reader.calls(), 3);
}

#[tokio::test]
async fn test_concurrent_evaluations_share_one_run() {
    let reader = Arc::new(
        MockReader::new(&[(WETH, Behavior::Balance("150"))]).with_delay(Duration::from_millis(100)),
    );
    let engine = engine_with(137, reader.clone());
    let req = request(json!({ "operator": "AND", "children": [erc20(WETH, "100")] }));

    let (a, b) = tokio::join!(engine.evaluate(&req), engine.evaluate(&req));

    assert_eq!(reader.calls(), 1);
    assert!(Arc::ptr_eq(&a, &b));
}

#[tokio::test]
async fn test_account_case_shares_cache_entry() {
    let reader = Arc::new(MockReader::new(&[(WETH, Behavior::Balance("150"))]));
    let engine = engine_with(137, reader.clone());
    let spec = Arc::new(
        ConditionSpec::from_value(&json!({ "operator": "AND", "children": [erc20(WETH, "100")] }))
            .unwrap(),
    );

    engine
        .check_conditions(Some(ACCOUNT), spec.clone())
        .await
        .unwrap();
    engine
        .check_conditions(Some(&ACCOUNT.to_uppercase().replacen("0X", "0x", 1)), spec)
        .await
        .unwrap();

    assert_eq!(reader.calls(), 1);
}

#[tokio::test]
async fn test_check_conditions_response_shape() {
    let reader = Arc::new(MockReader::new(&[(WETH, Behavior::Balance("150"))]));
    let engine = engine_with(137, reader.clone());
    let spec = Arc::new(
        ConditionSpec::from_value(&json!({
            "operator": "AND",
            "children": [erc20(WETH, "100"), erc20(SLOW, "1")]
        }))
        .unwrap(),
    );

    let response = engine.check_conditions(Some(ACCOUNT), spec.clone()).await.unwrap();
    let body = serde_json::to_value(&response).unwrap();
    assert_eq!(body["result"], false);
    assert_eq!(body["partialResults"]["0"], true);
    assert!(body["partialResults"]["1"].is_null());
    assert_eq!(body["balances"]["0"], "150");
    assert!(body["errorMessage"].as_str().unwrap().contains("RpcFailure"));

    let anonymous = engine.check_conditions(None, spec.clone()).await.unwrap();
    assert!(!anonymous.result);
    assert!(anonymous.partial_results.is_empty());

    assert!(engine.check_conditions(Some("not-an-address"), spec).await.is_err());
    assert_eq!(reader.calls(), 2);
}

#[tokio::test]
async fn test_unregistered_chain_is_unsupported_not_fatal() {
    let reader = Arc::new(MockReader::new(&[(WETH, Behavior::Balance("150"))]));
    let engine = engine_with(137, reader);

    let result = engine
        .evaluate(&request(json!({
            "operator": "OR",
            "children": [
                { "chainId": 8453, "assetType": "NATIVE", "amount": "1" },
                erc20(WETH, "100")
            ]
        })))
        .await;

    assert!(result.final_result);
    assert_eq!(result.errors[&0], ErrorKind::UnsupportedChain);
    assert_eq!(result.per_condition_result[&0], Outcome::Unknown);
}

#[tokio::test]
async fn test_gate_never_fetches_payload_on_denial() {
    let reader = Arc::new(MockReader::new(&[(WETH, Behavior::Balance("5"))]));
    let payloads = Arc::new(MockPayloads {
        fetches: AtomicUsize::new(0),
    });
    let gate = ProtectedContentGate::new(engine_with(137, reader), payloads.clone());
    let spec = Arc::new(
        ConditionSpec::from_value(&json!({ "operator": "AND", "children": [erc20(WETH, "100")] }))
            .unwrap(),
    );

    let decision = gate.open(Some(ACCOUNT), spec.clone(), &page()).await.unwrap();
    match decision {
        GateDecision::Denied(denial) => {
            assert_eq!(denial.per_condition_result[&0], Outcome::NotMet);
            assert_eq!(denial.balances[&0].to_string(), "5");
            assert_eq!(denial.details[0].owned.as_deref(), Some("0.000000000000000005"));
            assert_eq!(denial.details[0].required, "0.0000000000000001");
        }
        other => panic!("expected denial, got {:?}", other.state()),
    }

    let anonymous = gate.open(None, spec, &page()).await.unwrap();
    assert!(matches!(anonymous, GateDecision::NeedsWallet));

    assert_eq!(payloads.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_gate_partial_unknown_and_retry() {
    let reader = Arc::new(MockReader::new(&[(SLOW, Behavior::Fail)]));
    let payloads = Arc::new(MockPayloads {
        fetches: AtomicUsize::new(0),
    });
    let gate = ProtectedContentGate::new(engine_with(137, reader.clone()), payloads.clone());
    let spec = Arc::new(
        ConditionSpec::from_value(&json!({ "operator": "AND", "children": [erc20(SLOW, "1")] }))
            .unwrap(),
    );

    let first = gate.open(Some(ACCOUNT), spec.clone(), &page()).await.unwrap();
    assert_eq!(first.state(), AccessState::PartiallyUnknown);

    // Cached until retried.
    gate.open(Some(ACCOUNT), spec.clone(), &page()).await.unwrap();
    assert_eq!(reader.calls(), 1);

    let retried = gate.retry(Some(ACCOUNT), spec, &page()).await.unwrap();
    assert_eq!(retried.state(), AccessState::PartiallyUnknown);
    assert_eq!(reader.calls(), 2);
    assert_eq!(payloads.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_gate_releases_payload_when_granted() {
    let reader = Arc::new(MockReader::new(&[(WETH, Behavior::Balance("150"))]));
    let payloads = Arc::new(MockPayloads {
        fetches: AtomicUsize::new(0),
    });
    let gate = ProtectedContentGate::new(engine_with(137, reader), payloads.clone());
    let spec = Arc::new(
        ConditionSpec::from_value(&json!({ "operator": "AND", "children": [erc20(WETH, "100")] }))
            .unwrap(),
    );

    match gate.open(Some(ACCOUNT), spec, &page()).await.unwrap() {
        GateDecision::Granted { payload, result } => {
            assert_eq!(payload.body["secret"], "members only");
            assert!(result.final_result);
        }
        other => panic!("expected grant, got {:?}", other.state()),
    }
    assert_eq!(payloads.fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_wallet_switch_mid_evaluation() {
    let reader = Arc::new(
        MockReader::new(&[(WETH, Behavior::Balance("150"))]).with_delay(Duration::from_millis(50)),
    );
    let engine = engine_with(137, reader);
    let spec = Arc::new(
        ConditionSpec::from_value(&json!({ "operator": "AND", "children": [erc20(WETH, "100")] }))
            .unwrap(),
    );
    let old = EvaluationRequest::new(
        ACCOUNT.parse::<Address>().unwrap(),
        spec.clone(),
    );
    let new = EvaluationRequest::new(
        "0x000000000000000000000000000000000000dead"
            .parse::<Address>()
            .unwrap(),
        spec,
    );

    let mut view = PageView::new();
    view.begin(old.key());
    let in_flight = {
        let engine = engine.clone();
        let old = old.clone();
        tokio::spawn(async move { engine.evaluate(&old).await })
    };
    view.begin(new.key());

    let old_result = in_flight.await.unwrap();
    assert!(old_result.final_result);
    assert!(!view.apply(&old.key(), &old_result));
    assert_eq!(view.state(), AccessState::Evaluating);

    let new_result = engine.evaluate(&new).await;
    assert!(view.apply(&new.key(), &new_result));
    assert_eq!(view.state(), AccessState::Granted);
}

#[tokio::test]
async fn test_retry_reads_again_while_evaluation_in_flight() {
    let reader = Arc::new(
        MockReader::new(&[(WETH, Behavior::Balance("150"))]).with_delay(Duration::from_millis(80)),
    );
    let engine = engine_with(137, reader.clone());
    let req = request(json!({ "operator": "AND", "children": [erc20(WETH, "100")] }));

    let in_flight = {
        let engine = engine.clone();
        let req = req.clone();
        tokio::spawn(async move { engine.evaluate(&req).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let retried = engine.retry(&req).await;
    let original = in_flight.await.unwrap();

    assert_eq!(reader.calls(), 2);
    assert!(!Arc::ptr_eq(&original, &retried));
    assert!(retried.final_result);
}
