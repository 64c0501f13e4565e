use alloy::primitives::Address;
use deploy_scripts::{
    client::ChainClient,
    constants::{PERMIT2, PROXY_IMPLEMENTATION_STORAGE_SLOT},
    errors::ScriptError,
    sequencer::StepOutcome,
    types::ProxyInstance,
};
use eyre::Result;
use tests::{
    mock_chain::Upgrade,
    utils::{changed_steps, outcome_of, TestEnv, TEST_FILLER},
};

#[tokio::test]
async fn test_upgrade_never_reinitializes() -> Result<()> {
    let mut env = TestEnv::new()?;
    env.deploy(&["PredyPool"]).await?;
    let proxy = env.record("PredyPool")?.address;
    let old_implementation = env.record("PredyPool_Implementation")?.address;

    env.fixtures.bump("PredyPool", 1)?;
    let reports = env.deploy(&["PredyPool"]).await?;
    let new_implementation = env.record("PredyPool_Implementation")?.address;
    assert_ne!(new_implementation, old_implementation);

    assert_eq!(
        outcome_of(&reports, "PredyPool")?,
        &StepOutcome::ProxyUpgraded(ProxyInstance {
            proxy_address: proxy,
            implementation_address: new_implementation,
            initializer_called: false,
        })
    );
    assert_eq!(env.chain.initializer_calls().len(), 1);
    assert_eq!(
        env.chain.upgrades(),
        vec![Upgrade {
            proxy,
            from: old_implementation,
            to: new_implementation,
        }]
    );

    // Dependents keep reading the proxy address
    let pool = env.record("PredyPool")?;
    assert_eq!(pool.address, proxy);
    assert_eq!(pool.implementation, Some(new_implementation));
    assert_eq!(
        env.record("PredyPool_Proxy")?.implementation,
        Some(new_implementation)
    );

    let slot = env
        .chain
        .storage_at(proxy, PROXY_IMPLEMENTATION_STORAGE_SLOT)
        .await?;
    assert_eq!(slot, new_implementation.into_word());

    // Once upgraded, the proxy is current
    let sent = env.chain.tx_count();
    let reports = env.deploy(&["PredyPool"]).await?;
    assert!(changed_steps(&reports).is_empty());
    assert_eq!(env.chain.tx_count(), sent);
    assert_eq!(env.chain.initializer_calls().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_failed_upgrade_resumes() -> Result<()> {
    let mut env = TestEnv::new()?;
    env.deploy(&["PredyPool"]).await?;
    let old_implementation = env.record("PredyPool_Implementation")?.address;

    // The new implementation deploys, the upgrade itself fails
    env.fixtures.bump("PredyPool", 1)?;
    env.chain.fail_after(Some(1));
    let err = env.deploy(&["PredyPool"]).await.unwrap_err();
    assert!(matches!(err, ScriptError::TransactionFailure(_)));
    assert_eq!(
        env.record("PredyPool")?.implementation,
        Some(old_implementation)
    );

    env.chain.fail_after(None);
    let sent = env.chain.tx_count();
    let reports = env.deploy(&["PredyPool"]).await?;

    // Only the upgrade is sent, the implementation is reused
    assert_eq!(env.chain.tx_count(), sent + 1);
    assert!(matches!(
        outcome_of(&reports, "PredyPool")?,
        StepOutcome::ProxyUpgraded(_)
    ));
    assert_eq!(env.chain.initializer_calls().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_proxy_slot_disagreement_is_refused() -> Result<()> {
    let mut env = TestEnv::new()?;
    env.deploy(&["PredyPool"]).await?;
    let proxy = env.record("PredyPool")?.address;

    env.chain.set_storage(
        proxy,
        PROXY_IMPLEMENTATION_STORAGE_SLOT,
        Address::repeat_byte(0xbb).into_word(),
    );
    let sent = env.chain.tx_count();

    let err = env.deploy(&["PredyPool"]).await.unwrap_err();
    assert!(matches!(err, ScriptError::ProxyState(_)));
    assert_eq!(env.chain.tx_count(), sent);
    Ok(())
}

#[tokio::test]
async fn test_market_initializer_arguments() -> Result<()> {
    let mut env = TestEnv::new()?;
    env.deploy(&["PredyPool", "quoter", "perp"]).await?;

    let pool = env.record("PredyPool")?.address;
    let quoter = env.record("PredyPoolQuoter")?.address;
    let market = env.record("PerpMarket")?;
    assert_eq!(market.args, vec![pool, PERMIT2, TEST_FILLER, quoter]);
    assert_eq!(
        env.record("PerpMarketQuoter")?.args,
        vec![market.address]
    );

    let call = env
        .chain
        .initializer_calls()
        .into_iter()
        .find(|call| call.proxy == market.address)
        .ok_or_else(|| eyre::eyre!("market was not initialized"))?;
    assert_eq!(call.calldata.len(), 4 + 4 * 32);
    for (i, arg) in market.args.iter().enumerate() {
        let word = 4 + i * 32;
        assert_eq!(&call.calldata[word + 12..word + 32], arg.as_slice());
    }

    // The deployer owns the proxy
    let deployer = env.chain.deployer();
    assert_eq!(call.owner, deployer);
    assert_eq!(env.chain.proxy_owner(market.address), Some(deployer));
    assert_eq!(
        env.record("PerpMarket_Proxy")?.args,
        vec![env.record("PerpMarket_Implementation")?.address, deployer]
    );
    Ok(())
}

#[tokio::test]
async fn test_upgrade_keeps_executed_initializer_arguments() -> Result<()> {
    let mut env = TestEnv::new()?;
    env.deploy(&["PredyPool", "quoter", "perp"]).await?;
    let initialized_with = env.record("PerpMarket")?.args.clone();
    assert_eq!(initialized_with[2], TEST_FILLER);
    assert_eq!(
        env.record("PerpMarket_Proxy")?
            .execute
            .clone()
            .map(|call| (call.method_name, call.args)),
        Some(("initialize".to_string(), initialized_with.clone()))
    );

    // A different filler cannot reach an already initialized market
    let new_filler = Address::repeat_byte(0x77);
    env.book = env.book.clone().with_filler(Some(new_filler));
    env.fixtures.bump("PerpMarket", 1)?;
    let reports = env.deploy(&["PredyPool", "quoter", "perp"]).await?;

    assert!(matches!(
        outcome_of(&reports, "PerpMarket")?,
        StepOutcome::ProxyUpgraded(_)
    ));
    let market = env.record("PerpMarket")?;
    assert_eq!(market.args, initialized_with);
    assert!(!market.args.contains(&new_filler));

    let calls = env
        .chain
        .initializer_calls()
        .into_iter()
        .filter(|call| call.proxy == market.address)
        .count();
    assert_eq!(calls, 1);
    Ok(())
}
