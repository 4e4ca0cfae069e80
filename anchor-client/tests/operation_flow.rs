//! End-to-end operation flow against the stub chain.
//!
//! Drives a deposit that needs an approval through the public API, with a
//! projector running next to it, and checks the status stream.

use std::sync::Arc;
use std::time::Duration;

use anchor_client::{
    ClientError, ClientEvent, Config, EventBus, HealthProjector, OperationInput,
    OperationOrchestrator, ProjectionInput, ProjectionUpdate, TxPurpose,
};
use anchor_domain::{OperationKind, OperationState};
use anchor_exec::{ContractFunction, StubChain, StubProjections};

#[tokio::test(start_paused = true)]
async fn test_deposit_with_approval_end_to_end() -> anyhow::Result<()> {
    let config = Config::test();
    let registry = config.asset_registry()?;
    let account = config.require_account()?;

    let chain = Arc::new(StubChain::new());
    let bus = Arc::new(EventBus::default());
    let mut events = bus.subscribe();
    let orchestrator = OperationOrchestrator::new(chain.clone(), &config, bus)?;

    let projections = Arc::new(StubProjections::new());
    let projector = HealthProjector::spawn(projections.clone(), account, &config.projector);

    let request = OperationInput::new(OperationKind::Deposit, "1.25")
        .with_asset("WETH")
        .to_request(&registry)?;
    let operation_id = request.id();

    projector.update(Some(ProjectionInput::from_request(&request)));
    let receipt = orchestrator.submit(request).await?;

    // Status stream: every transition, both broadcasts, then the outcome
    let mut states = vec![OperationState::Idle];
    let mut broadcasts = Vec::new();
    let mut confirmed = None;
    for event in events.drain() {
        match event {
            ClientEvent::StateChanged { operation_id: id, to, .. } => {
                assert_eq!(id, Some(operation_id));
                states.push(to);
            }
            ClientEvent::TransactionSubmitted { purpose, tx_hash, .. } => {
                broadcasts.push((purpose, tx_hash));
            }
            ClientEvent::OperationConfirmed { receipt, .. } => confirmed = Some(receipt),
            ClientEvent::OperationFailed { reason, .. } => panic!("unexpected failure: {}", reason),
        }
    }

    assert_eq!(
        states,
        vec![
            OperationState::Idle,
            OperationState::CheckingAllowance,
            OperationState::AwaitingApprovalSignature,
            OperationState::ApprovalPending,
            OperationState::ApprovalConfirmed,
            OperationState::AwaitingExecutionSignature,
            OperationState::ExecutionPending,
            OperationState::Confirmed,
        ]
    );
    assert_eq!(broadcasts.len(), 2);
    assert_eq!(broadcasts[0].0, TxPurpose::Approval);
    assert_eq!(broadcasts[1], (TxPurpose::Execution, receipt.tx_hash));
    assert_eq!(confirmed, Some(receipt));

    let calls = chain.submitted_calls();
    assert!(matches!(calls[0].function, ContractFunction::Approve { .. }));
    assert!(matches!(calls[1].function, ContractFunction::DepositCollateral { .. }));

    // The projector settled independently of the operation
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(matches!(projector.latest(), ProjectionUpdate::Ready { .. }));
    assert_eq!(projections.call_count(), 1);

    // Grace period, then idle
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(orchestrator.state(), OperationState::Idle);

    // A second deposit of the same amount reuses the delegation
    let again = OperationInput::new(OperationKind::Deposit, "1.25")
        .with_asset("WETH")
        .to_request(&registry)?;
    orchestrator.submit(again).await?;
    assert_eq!(chain.submitted_calls().len(), 3);

    Ok(())
}

#[tokio::test]
async fn test_mint_simulation_revert_surfaces_reason() -> anyhow::Result<()> {
    let config = Config::test();
    let registry = config.asset_registry()?;
    let chain = Arc::new(StubChain::new());
    chain.set_revert("mintAUSD", "AUSDEngine__BreaksHealthFactor(420000000000000000)");

    let orchestrator =
        OperationOrchestrator::new(chain.clone(), &config, Arc::new(EventBus::default()))?;
    let request = OperationInput::new(OperationKind::Mint, "5000").to_request(&registry)?;

    let err = orchestrator.submit(request).await.unwrap_err();

    match err {
        ClientError::SimulationReverted { function, reason } => {
            assert_eq!(function, "mintAUSD");
            assert_eq!(reason, "AUSDEngine__BreaksHealthFactor(420000000000000000)");
        }
        other => panic!("expected SimulationReverted, got {:?}", other),
    }
    assert_eq!(orchestrator.state(), OperationState::Failed);
    assert_eq!(chain.signature_requests(), 0);

    Ok(())
}
