//! Mint and admin write flows.

mod common;

use std::{sync::Arc, time::Duration};

use serde_json::Value;

use common::{addr, test_config, wait_for, whitelist_log, MockProvider};
use nft_mint_client::{
    chain::{abi, contract::WHITELIST_UPDATED},
    error::{ProviderError, WalletError},
    mutation::{AdminAction, WhitelistEntry},
    AppState,
};

async fn connected(mock: &Arc<MockProvider>) -> Arc<AppState> {
    let state = AppState::new(test_config(), Some(mock.as_wallet()));
    state.session.connect().await;
    state
}

fn sent_selectors(mock: &MockProvider) -> Vec<String> {
    mock.requests("eth_sendTransaction")
        .iter()
        .map(|p| p[0]["data"].as_str().unwrap_or_default()[..10].to_string())
        .collect()
}

fn selector_hex(signature: &str) -> String {
    format!("0x{}", hex::encode(abi::selector(signature)))
}

#[tokio::test]
async fn mint_submits_and_confirms() {
    let mock = MockProvider::on_sepolia(addr(0x11));
    mock.script_contract(addr(0x0f));
    let state = connected(&mock).await;

    let result = state.mutations.mint().await;

    assert!(!result.in_progress);
    assert!(result.tx_hash.is_some());
    assert_eq!(result.error, None);
    assert_eq!(sent_selectors(&mock), vec![selector_hex("mint()")]);

    let tx = &mock.requests("eth_sendTransaction")[0][0];
    assert_eq!(tx["from"], addr(0x11).to_string());
    assert_eq!(tx["to"], common::contract_address().to_string());

    // Confirmed mints refresh the user's context.
    assert_eq!(state.reconciler.user_context().user_mint_count, 1);
}

#[tokio::test]
async fn concurrent_mints_send_one_transaction() {
    let mock = MockProvider::on_sepolia(addr(0x11));
    mock.script_contract(addr(0x0f));
    let state = connected(&mock).await;

    let (first, second) = tokio::join!(state.mutations.mint(), state.mutations.mint());

    assert_eq!(mock.count("eth_sendTransaction"), 1);
    assert!(!first.in_progress);
    assert!(second.in_progress);
    assert!(!state.mutations.mint_state().in_progress);
}

#[tokio::test]
async fn mint_when_disconnected_only_notifies() {
    let mock = MockProvider::on_sepolia(addr(0x11));
    let state = AppState::new(test_config(), Some(mock.as_wallet()));
    let mut rx = state.events.subscribe();

    let result = state.mutations.mint().await;

    assert!(!result.in_progress);
    assert_eq!(mock.count("eth_sendTransaction"), 0);
    let notice: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
    assert_eq!(notice["message"], "Please connect your wallet first.");
}

#[tokio::test]
async fn mint_reports_revert_reason() {
    let mock = MockProvider::on_sepolia(addr(0x11));
    mock.fail(
        "eth_sendTransaction",
        ProviderError::rpc(-32000, "execution reverted: Max mints reached"),
    );
    let state = connected(&mock).await;

    let result = state.mutations.mint().await;

    assert!(!result.in_progress);
    assert_eq!(result.tx_hash, None);
    assert_eq!(result.error.as_deref(), Some("Max mints reached"));
}

#[tokio::test]
async fn mint_without_reason_reports_generic_failure() {
    let mock = MockProvider::on_sepolia(addr(0x11));
    mock.fail("eth_sendTransaction", ProviderError::rpc(-32000, "nonce too low"));
    let state = connected(&mock).await;

    let result = state.mutations.mint().await;
    assert_eq!(result.error.as_deref(), Some("An unknown error occurred."));
}

#[tokio::test]
async fn rejected_mint_reports_rejection() {
    let mock = MockProvider::on_sepolia(addr(0x11));
    mock.fail("eth_sendTransaction", ProviderError::rpc(4001, "User denied transaction signature."));
    let state = connected(&mock).await;

    let result = state.mutations.mint().await;
    assert_eq!(result.error.as_deref(), Some("Request rejected in wallet."));
}

#[tokio::test]
async fn reverted_receipt_keeps_hash_and_sets_error() {
    let mock = MockProvider::on_sepolia(addr(0x11));
    mock.set_receipt_success(false);
    let state = connected(&mock).await;

    let result = state.mutations.mint().await;

    assert!(result.tx_hash.is_some());
    assert_eq!(result.error.as_deref(), Some("transaction reverted"));
    assert!(!result.in_progress);
}

#[tokio::test]
async fn hash_is_recorded_before_confirmation() {
    let mock = MockProvider::on_sepolia(addr(0x11));
    mock.script_contract(addr(0x0f));
    mock.set_receipts_pending(true);
    let state = connected(&mock).await;

    let task = tokio::spawn({
        let state = state.clone();
        async move { state.mutations.mint().await }
    });

    wait_for(|| state.mutations.mint_state().tx_hash.is_some()).await;
    assert!(state.mutations.mint_state().in_progress);

    mock.set_receipts_pending(false);
    let result = task.await.unwrap();
    assert!(!result.in_progress);
    assert_eq!(result.error, None);
}

#[tokio::test]
async fn dropped_mint_releases_in_progress() {
    let mock = MockProvider::on_sepolia(addr(0x11));
    mock.script_contract(addr(0x0f));
    mock.set_receipts_pending(true);
    let state = connected(&mock).await;

    let result = tokio::time::timeout(Duration::from_millis(50), state.mutations.mint()).await;
    assert!(result.is_err());

    let after = state.mutations.mint_state();
    assert!(!after.in_progress);
    assert!(after.tx_hash.is_some());

    mock.set_receipts_pending(false);
    let retry = state.mutations.mint().await;
    assert_eq!(mock.count("eth_sendTransaction"), 2);
    assert!(!retry.in_progress);
    assert_eq!(retry.error, None);
}

#[tokio::test]
async fn receipt_query_errors_are_retried() {
    let mock = MockProvider::on_sepolia(addr(0x11));
    mock.script_contract(addr(0x0f));
    mock.fail(
        "eth_getTransactionReceipt",
        ProviderError::Transport("connection reset".into()),
    );
    let state = connected(&mock).await;

    let task = tokio::spawn({
        let state = state.clone();
        async move { state.mutations.mint().await }
    });

    wait_for(|| mock.count("eth_getTransactionReceipt") >= 2).await;
    assert!(state.mutations.mint_state().in_progress);

    mock.clear_failure("eth_getTransactionReceipt");
    let result = task.await.unwrap();
    assert_eq!(result.error, None);
    assert_eq!(state.reconciler.user_context().user_mint_count, 1);
}

#[tokio::test]
async fn new_mint_clears_previous_error() {
    let mock = MockProvider::on_sepolia(addr(0x11));
    mock.script_contract(addr(0x0f));
    mock.fail("eth_sendTransaction", ProviderError::rpc(-32000, "execution reverted: Not whitelisted"));
    let state = connected(&mock).await;
    assert!(state.mutations.mint().await.error.is_some());

    mock.clear_failure("eth_sendTransaction");
    let result = state.mutations.mint().await;
    assert_eq!(result.error, None);
    assert!(result.tx_hash.is_some());
}

#[tokio::test]
async fn admin_action_refreshes_snapshot_and_invalidates_cache() {
    let owner = addr(0x11);
    let mock = MockProvider::on_sepolia(owner);
    mock.script_contract(owner);
    mock.set_logs(WHITELIST_UPDATED, vec![whitelist_log(addr(0xaa), true, 1, 0)]);
    let state = connected(&mock).await;
    state.reconciler.refresh_all().await;
    assert!(state.reconciler.has_scanned());

    let hash = state.mutations.set_max_mints(10).await.unwrap();

    assert_eq!(state.mutations.mint_state().tx_hash, None);
    assert_eq!(sent_selectors(&mock), vec![selector_hex("setMaxMintsPerUser(uint256)")]);
    assert_eq!(state.reconciler.snapshot().owner_address, Some(owner));
    assert!(!state.reconciler.has_scanned());
    assert_eq!(hash.to_string().len(), 66);
}

#[tokio::test]
async fn whitelist_action_shape_follows_entry_count() {
    let mock = MockProvider::on_sepolia(addr(0x11));
    mock.script_contract(addr(0x11));
    let state = connected(&mock).await;

    state
        .mutations
        .update_whitelist(&[addr(0xaa)], &[true])
        .await
        .unwrap();
    state
        .mutations
        .update_whitelist(&[addr(0xaa)], &[false])
        .await
        .unwrap();
    state
        .mutations
        .update_whitelist(&[addr(0xaa), addr(0xbb)], &[true, false])
        .await
        .unwrap();

    assert_eq!(
        sent_selectors(&mock),
        vec![
            selector_hex("addToWhitelist(address)"),
            selector_hex("removeFromWhitelist(address)"),
            selector_hex("batchUpdateWhitelist(address[],bool[])"),
        ]
    );
}

#[tokio::test]
async fn invalid_whitelist_updates_are_rejected_locally() {
    let mock = MockProvider::on_sepolia(addr(0x11));
    let state = connected(&mock).await;

    let empty = state
        .mutations
        .run_admin_action(AdminAction::SetWhitelist(vec![]))
        .await;
    assert!(matches!(empty, Err(WalletError::InvalidArgument(_))));

    let mismatched = state
        .mutations
        .update_whitelist(&[addr(0xaa), addr(0xbb)], &[true])
        .await;
    assert!(matches!(mismatched, Err(WalletError::InvalidArgument(_))));

    assert_eq!(mock.count("eth_sendTransaction"), 0);
}

#[tokio::test]
async fn failed_admin_action_keeps_cache() {
    let mock = MockProvider::on_sepolia(addr(0x11));
    mock.script_contract(addr(0x11));
    let state = connected(&mock).await;
    state.reconciler.refresh_all().await;

    mock.fail("eth_sendTransaction", ProviderError::rpc(-32000, "execution reverted: Ownable: caller is not the owner"));
    let err = state.mutations.set_royalty(750).await.unwrap_err();

    assert_eq!(err.user_message(), "Ownable: caller is not the owner");
    assert!(state.reconciler.has_scanned());
}

#[tokio::test]
async fn duplicate_admin_actions_both_complete() {
    let mock = MockProvider::on_sepolia(addr(0x11));
    mock.script_contract(addr(0x11));
    let state = connected(&mock).await;

    let entry = WhitelistEntry {
        address: addr(0xaa),
        added: true,
    };
    let (a, b) = tokio::join!(
        state.mutations.set_base_uri("ipfs://new/"),
        state
            .mutations
            .run_admin_action(AdminAction::SetWhitelist(vec![entry])),
    );

    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(mock.count("eth_sendTransaction"), 2);
    assert!(!state.reconciler.has_scanned());
}
