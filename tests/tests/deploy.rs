use std::collections::BTreeMap;

use alloy::primitives::{keccak256, Address};
use deploy_scripts::{
    constants::UNISWAP_V3_FACTORY,
    errors::ScriptError,
    sequencer::StepOutcome,
    types::{AddressBook, LibraryLinks},
};
use eyre::Result;
use tests::utils::{changed_steps, contains_bytes, outcome_of, TestEnv};

/// The steps deploying the pool, in execution order
const PREDY_POOL_STEPS: [&str; 8] = [
    "AddPairLogic",
    "ReaderLogic",
    "Trade",
    "TradeLogic",
    "LiquidationLogic",
    "SupplyLogic",
    "ReallocationLogic",
    "PredyPool",
];

#[tokio::test]
async fn test_predy_pool_deployment() -> Result<()> {
    let mut env = TestEnv::new()?;
    let reports = env.deploy(&["PredyPool"]).await?;

    let names: Vec<_> = reports.iter().map(|report| report.name).collect();
    assert_eq!(names, PREDY_POOL_STEPS);
    // One record per step, plus the implementation and proxy of the pool
    assert_eq!(env.registry.len(), PREDY_POOL_STEPS.len() + 2);

    let pool = env.record("PredyPool")?;
    let implementation = env.record("PredyPool_Implementation")?.address;
    assert_eq!(pool.address, env.record("PredyPool_Proxy")?.address);
    assert_eq!(pool.implementation, Some(implementation));
    assert_eq!(pool.libraries.len(), 6);
    assert_eq!(pool.args, vec![UNISWAP_V3_FACTORY]);

    // `initialize(factory)` ran exactly once, through the proxy constructor
    let calls = env.chain.initializer_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].proxy, pool.address);
    assert_eq!(calls[0].implementation, implementation);
    assert_eq!(calls[0].calldata.len(), 4 + 32);
    assert_eq!(
        &calls[0].calldata[..4],
        &keccak256("initialize(address)")[..4]
    );
    assert_eq!(&calls[0].calldata[16..], UNISWAP_V3_FACTORY.as_slice());

    match outcome_of(&reports, "PredyPool")? {
        StepOutcome::ProxyDeployed(proxy) => assert!(proxy.initializer_called),
        outcome => panic!("unexpected outcome {:?}", outcome),
    }

    Ok(())
}

#[tokio::test]
async fn test_libraries_linked_into_bytecode() -> Result<()> {
    let mut env = TestEnv::new()?;
    env.deploy(&["PredyPool"]).await?;

    let pool = env.record("PredyPool")?;
    let code = env
        .chain
        .creation_code(env.record("PredyPool_Implementation")?.address)
        .unwrap_or_default();
    for (library, address) in &pool.libraries {
        assert_eq!(*address, env.record(library)?.address);
        assert!(contains_bytes(&code, address.as_slice()), "{} not linked", library);
    }

    let trade = env.record("Trade")?.address;
    for dependent in ["TradeLogic", "LiquidationLogic"] {
        let record = env.record(dependent)?;
        let code = env.chain.creation_code(record.address).unwrap_or_default();
        assert_eq!(record.libraries.get("Trade"), Some(&trade));
        assert!(contains_bytes(&code, trade.as_slice()));
    }

    Ok(())
}

#[tokio::test]
async fn test_gamma_before_predy_pool_fails() -> Result<()> {
    let mut env = TestEnv::new()?;

    let err = env.deploy(&["gamma"]).await.unwrap_err();
    assert_eq!(
        err,
        ScriptError::missing_dependency("GammaTradeMarketL2", "PredyPool")
    );

    // The pool alone does not satisfy the market either
    let err = env.deploy(&["PredyPool", "gamma"]).await.unwrap_err();
    assert_eq!(
        err,
        ScriptError::missing_dependency("GammaTradeMarketL2", "PredyPoolQuoter")
    );

    assert_eq!(env.chain.tx_count(), 0);
    assert!(env.registry.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_rerun_is_idempotent() -> Result<()> {
    let mut env = TestEnv::new()?;
    let first = env.deploy(&[]).await?;
    assert!(first.iter().all(|report| report.outcome.changed()));

    let sent = env.chain.tx_count();
    let initialized = env.chain.initializer_calls().len();
    assert_eq!(initialized, 3);

    let second = env.deploy(&[]).await?;
    assert!(changed_steps(&second).is_empty());

    // Records read back from disk are just as current
    env.reopen_registry()?;
    let third = env.deploy(&[]).await?;
    assert!(changed_steps(&third).is_empty());

    assert_eq!(env.chain.tx_count(), sent);
    assert_eq!(env.chain.initializer_calls().len(), initialized);
    Ok(())
}

#[tokio::test]
async fn test_resume_after_failure() -> Result<()> {
    let mut env = TestEnv::new()?;
    env.chain.fail_after(Some(3));

    let err = env.deploy(&["PredyPool"]).await.unwrap_err();
    assert!(matches!(err, ScriptError::TransactionFailure(_)));

    // Progress made before the failure survives
    env.reopen_registry()?;
    assert_eq!(env.registry.len(), 3);
    for name in &PREDY_POOL_STEPS[..3] {
        assert!(env.registry.contains(name));
    }

    env.chain.fail_after(None);
    let reports = env.deploy(&["PredyPool"]).await?;
    assert_eq!(changed_steps(&reports), PREDY_POOL_STEPS[3..]);
    assert_eq!(env.chain.initializer_calls().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_deployments_are_deterministic() -> Result<()> {
    type Linkage = BTreeMap<String, (Address, LibraryLinks, Vec<Address>)>;

    fn linkage(env: &TestEnv) -> Linkage {
        env.registry
            .records()
            .map(|(name, record)| {
                (
                    name.to_string(),
                    (record.address, record.libraries.clone(), record.args.clone()),
                )
            })
            .collect()
    }

    let mut first = TestEnv::new()?;
    first.deploy(&[]).await?;
    let mut second = TestEnv::new()?;
    second.deploy(&[]).await?;

    assert_eq!(linkage(&first), linkage(&second));
    Ok(())
}

#[tokio::test]
async fn test_missing_filler_sends_nothing() -> Result<()> {
    let mut env = TestEnv::new()?;
    env.book = AddressBook::default();

    let err = env.deploy(&["PredyPool", "quoter", "perp"]).await.unwrap_err();
    assert!(matches!(err, ScriptError::Config(_)));
    assert_eq!(env.chain.tx_count(), 0);

    // Markets are the only steps reading the filler
    env.deploy(&["PredyPool", "quoter"]).await?;
    Ok(())
}

#[tokio::test]
async fn test_library_change_cascades_to_dependents() -> Result<()> {
    let mut env = TestEnv::new()?;
    env.deploy(&["PredyPool", "quoter"]).await?;
    let pool = env.record("PredyPool")?.address;

    env.fixtures.bump("Trade", 1)?;
    let reports = env.deploy(&["PredyPool", "quoter"]).await?;

    // The quoter only depends on the pool's proxy, which does not move
    assert_eq!(
        changed_steps(&reports),
        vec!["Trade", "TradeLogic", "LiquidationLogic", "PredyPool"]
    );
    assert_eq!(env.record("PredyPool")?.address, pool);
    assert_eq!(env.chain.upgrades().len(), 1);
    assert_eq!(env.chain.initializer_calls().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_wiped_chain_is_redeployed() -> Result<()> {
    let mut env = TestEnv::new()?;
    env.deploy(&["PredyPool", "quoter"]).await?;
    let quoter = env.record("PredyPoolQuoter")?.address;

    env.chain.wipe();
    let reports = env.deploy(&["PredyPool", "quoter"]).await?;

    assert!(reports.iter().all(|report| report.outcome.changed()));
    assert_ne!(env.record("PredyPoolQuoter")?.address, quoter);
    // A new proxy is a new contract, so it is initialized again
    assert_eq!(env.chain.initializer_calls().len(), 2);
    Ok(())
}
