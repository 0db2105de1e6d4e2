mod common;

use bitcoin::consensus::encode::serialize_hex;
use bitcoin::ScriptBuf;
use common::*;
use keyshard_transfer::{
    parse_address, verify_input, FeeRate, Network, Result, ShareReconstructor, SignedTransaction,
    SourceKey, TransferError, TransferMode, TransferRequest,
};

fn request(mode: TransferMode, fee_rate: FeeRate) -> TransferRequest {
    TransferRequest {
        source_key: source_key(),
        destination: DESTINATION.to_string(),
        mode,
        network: Network::Main,
        fee_rate,
    }
}

fn source_script() -> ScriptBuf {
    parse_address(SOURCE_ADDRESS, Network::Main)
        .unwrap()
        .script_pubkey()
}

fn destination_script() -> ScriptBuf {
    parse_address(DESTINATION, Network::Main)
        .unwrap()
        .script_pubkey()
}

#[tokio::test]
async fn test_fixed_amount_transfer_end_to_end() -> anyhow::Result<()> {
    let env = TestEnvironment::new().await?;
    let funding_txid = env.ledger().fund_value(SOURCE_ADDRESS, 100_000)?;

    let result = env
        .orchestrator()?
        .transfer(request(TransferMode::Amount(30_000), FeeRate::NORMAL))
        .await?;

    log::info!("Broadcast {}", result.txid);
    assert_eq!(result.fee, 1_130);
    assert_eq!(result.total_sent, 30_000);

    let signed = SignedTransaction::parse(&result.raw_tx_hex)?;
    assert_eq!(signed.txid, result.txid);

    let tx = &signed.transaction;
    assert_eq!(tx.input.len(), 1);
    assert_eq!(tx.input[0].previous_output.txid.to_string(), funding_txid);
    assert_eq!(tx.output.len(), 2);
    assert_eq!(tx.output[0].value.to_sat(), 30_000);
    assert_eq!(tx.output[0].script_pubkey, destination_script());
    assert_eq!(tx.output[1].value.to_sat(), 68_870);
    assert_eq!(tx.output[1].script_pubkey, source_script());

    let broadcasts = env.ledger().broadcasts();
    assert_eq!(broadcasts.len(), 1);
    assert_eq!(broadcasts[0], result.raw_tx_hex);
    assert_eq!(serialize_hex(tx), result.raw_tx_hex);

    Ok(())
}

#[tokio::test]
async fn test_sweep_transfer_sends_everything_but_the_fee() -> anyhow::Result<()> {
    let env = TestEnvironment::new().await?;
    env.ledger().fund_value(SOURCE_ADDRESS, 100_000)?;

    let result = env
        .orchestrator()?
        .transfer(request(TransferMode::Sweep, FeeRate::SLOW))
        .await?;

    assert_eq!(result.fee, 226);
    assert_eq!(result.total_sent, 99_774);

    let signed = SignedTransaction::parse(&result.raw_tx_hex)?;
    assert_eq!(signed.transaction.output.len(), 1);
    assert_eq!(signed.transaction.output[0].value.to_sat(), 99_774);

    Ok(())
}

#[tokio::test]
async fn test_exact_spend_drops_change_output() -> anyhow::Result<()> {
    let env = TestEnvironment::new().await?;
    env.ledger().fund_value(SOURCE_ADDRESS, 100_000)?;

    let result = env
        .orchestrator()?
        .transfer(request(TransferMode::Amount(99_774), FeeRate::SLOW))
        .await?;

    let signed = SignedTransaction::parse(&result.raw_tx_hex)?;
    assert_eq!(signed.transaction.output.len(), 1);
    assert_eq!(result.total_sent, 99_774);
    assert_eq!(result.fee, 226);

    Ok(())
}

#[tokio::test]
async fn test_every_input_carries_a_valid_signature() -> anyhow::Result<()> {
    let env = TestEnvironment::new().await?;
    let values = [20_000u64, 25_000, 15_000];
    for value in values {
        env.ledger().fund_value(SOURCE_ADDRESS, value)?;
    }

    let result = env
        .orchestrator()?
        .transfer(request(TransferMode::Amount(45_000), FeeRate::SLOW))
        .await?;

    // 3 inputs, 2 outputs: 10 + 3*148 + 2*34 = 522 bytes
    assert_eq!(result.fee, 522);

    let signed = SignedTransaction::parse(&result.raw_tx_hex)?;
    assert_eq!(signed.transaction.input.len(), 3);
    assert_eq!(signed.transaction.output[1].value.to_sat(), 60_000 - 45_000 - 522);

    let secp = bitcoin::secp256k1::Secp256k1::verification_only();
    for (index, value) in values.iter().enumerate() {
        verify_input(&secp, &signed.transaction, index, &source_script(), *value)?;
    }

    // A wrong spent amount changes the FORKID digest
    assert!(verify_input(&secp, &signed.transaction, 0, &source_script(), 20_001).is_err());

    Ok(())
}

#[tokio::test]
async fn test_no_utxos_fails_without_side_effects() -> anyhow::Result<()> {
    let env = TestEnvironment::new().await?;

    let err = env
        .orchestrator()?
        .transfer(request(TransferMode::Amount(1_000), FeeRate::NORMAL))
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::NoFunds(_)), "got {:?}", err);
    assert!(env.ledger().script_requests().is_empty());
    assert!(env.ledger().broadcasts().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_insufficient_funds_reports_shortfall() -> anyhow::Result<()> {
    let env = TestEnvironment::new().await?;
    env.ledger().fund_value(SOURCE_ADDRESS, 1_000)?;

    let err = env
        .orchestrator()?
        .transfer(request(TransferMode::Amount(30_000), FeeRate::NORMAL))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        TransferError::InsufficientFunds {
            needed: 31_130,
            available: 1_000
        }
    );
    assert!(env.ledger().broadcasts().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_sweep_of_dust_is_rejected() -> anyhow::Result<()> {
    let env = TestEnvironment::new().await?;
    env.ledger().fund_value(SOURCE_ADDRESS, 226)?;

    let err = env
        .orchestrator()?
        .transfer(request(TransferMode::Sweep, FeeRate::SLOW))
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::InsufficientFunds { .. }));
    assert!(env.ledger().broadcasts().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_invalid_destination_fails_before_any_request() -> anyhow::Result<()> {
    let env = TestEnvironment::new().await?;
    env.ledger().fund_value(SOURCE_ADDRESS, 100_000)?;
    let orchestrator = env.orchestrator()?;

    for destination in ["", "not-an-address", "mipcBbFg9gMiCh81Kj8tqqdgoZub1ZJRfn"] {
        let err = orchestrator
            .transfer(TransferRequest {
                destination: destination.to_string(),
                ..request(TransferMode::Amount(1_000), FeeRate::NORMAL)
            })
            .await
            .unwrap_err();
        assert!(
            matches!(err, TransferError::InvalidAddress(_)),
            "{:?} gave {:?}",
            destination,
            err
        );
    }

    let err = orchestrator
        .transfer(request(TransferMode::Amount(0), FeeRate::NORMAL))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::InvalidRequest(_)));

    assert_eq!(env.ledger().request_count(), 0);

    Ok(())
}

#[tokio::test]
async fn test_broadcast_rejection_reason_is_surfaced() -> anyhow::Result<()> {
    let env = TestEnvironment::new().await?;
    env.ledger().fund_value(SOURCE_ADDRESS, 100_000)?;
    env.ledger().reject_broadcasts("txn-mempool-conflict");

    let err = env
        .orchestrator()?
        .transfer(request(TransferMode::Amount(30_000), FeeRate::NORMAL))
        .await
        .unwrap_err();

    match err {
        TransferError::Broadcast(reason) => assert!(reason.contains("txn-mempool-conflict")),
        other => panic!("expected broadcast rejection, got {:?}", other),
    }
    assert!(env.ledger().broadcasts().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_signing_failure_never_broadcasts() -> anyhow::Result<()> {
    let env = TestEnvironment::new().await?;
    env.ledger().fund_value(SOURCE_ADDRESS, 60_000)?;
    let foreign = env.ledger().fund_value(SOURCE_ADDRESS, 40_000)?;
    // The indexer claims the second output is locked to someone else
    env.ledger()
        .override_script(&foreign, 0, &destination_script().to_hex_string());

    let err = env
        .orchestrator()?
        .transfer(request(TransferMode::Amount(30_000), FeeRate::NORMAL))
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::Signing(_)), "got {:?}", err);
    assert_eq!(env.ledger().script_requests().len(), 2);
    assert!(env.ledger().broadcasts().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_unpayable_fee_rate_is_insufficient_funds() -> anyhow::Result<()> {
    let env = TestEnvironment::new().await?;
    env.ledger().fund_value(SOURCE_ADDRESS, 100_000)?;
    let orchestrator = env.orchestrator()?;
    let huge = FeeRate::new(1e300)?;

    for mode in [TransferMode::Sweep, TransferMode::Amount(30_000)] {
        let err = orchestrator
            .transfer(request(mode, huge))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransferError::InsufficientFunds {
                needed: u64::MAX,
                available: 100_000
            }
        );

        let err = orchestrator
            .quote(Network::Main, SOURCE_ADDRESS, mode, huge)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::InsufficientFunds { needed: u64::MAX, .. }));
    }
    assert!(env.ledger().broadcasts().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_spent_inputs_are_rejected_on_retry() -> anyhow::Result<()> {
    let env = TestEnvironment::new().await?;
    env.ledger().fund_value(SOURCE_ADDRESS, 100_000)?;
    let orchestrator = env.orchestrator()?;

    let first = orchestrator
        .transfer(request(TransferMode::Amount(30_000), FeeRate::NORMAL))
        .await?;

    // The change output is now the only unspent output of the source
    let second = orchestrator
        .transfer(request(TransferMode::Sweep, FeeRate::NORMAL))
        .await?;
    let signed = SignedTransaction::parse(&second.raw_tx_hex)?;
    assert_eq!(signed.transaction.input.len(), 1);
    assert_eq!(signed.transaction.input[0].previous_output.txid.to_string(), first.txid);
    assert_eq!(second.total_sent, 68_870 - 1_130);

    // Replaying the first transaction spends outputs that are gone
    let replay = keyshard_transfer::Broadcaster::new(keyshard_transfer::IndexerClient::new(
        &env.config,
    )?)
    .broadcast(Network::Main, &first.raw_tx_hex)
    .await
    .unwrap_err();
    assert!(matches!(replay, TransferError::Broadcast(ref r) if r.contains("Missing inputs")));
    assert!(replay.is_retryable());

    Ok(())
}

#[tokio::test]
async fn test_every_request_carries_client_id() -> anyhow::Result<()> {
    let env = TestEnvironment::new().await?;
    env.ledger().fund_value(SOURCE_ADDRESS, 50_000)?;
    env.ledger().fund_value(SOURCE_ADDRESS, 50_000)?;

    env.orchestrator()?
        .transfer(request(TransferMode::Amount(30_000), FeeRate::NORMAL))
        .await?;

    let agents = env.ledger().user_agents();
    // unspent + 2 scripts + broadcast
    assert_eq!(agents.len(), 4);
    assert!(agents.iter().all(|ua| ua == TEST_CLIENT_ID));

    Ok(())
}

#[tokio::test]
async fn test_quote_matches_built_transfer() -> anyhow::Result<()> {
    let env = TestEnvironment::new().await?;
    env.ledger().fund_value(SOURCE_ADDRESS, 100_000)?;
    let orchestrator = env.orchestrator()?;

    let quote = orchestrator
        .quote(
            Network::Main,
            SOURCE_ADDRESS,
            TransferMode::Amount(30_000),
            FeeRate::NORMAL,
        )
        .await?;
    assert_eq!(quote.input_count, 1);
    assert_eq!(quote.available_base_units, 100_000);
    assert_eq!(quote.estimated_fee_base_units, 1_130);
    assert_eq!(quote.send_base_units, 30_000);

    let sweep = orchestrator
        .quote(Network::Main, SOURCE_ADDRESS, TransferMode::Sweep, FeeRate::SLOW)
        .await?;
    assert_eq!(sweep.send_base_units, 99_774);

    // Quoting never touches scripts or broadcasts
    assert!(env.ledger().script_requests().is_empty());
    assert!(env.ledger().broadcasts().is_empty());

    let err = orchestrator
        .quote(
            Network::Main,
            SOURCE_ADDRESS,
            TransferMode::Amount(99_000),
            FeeRate::NORMAL,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::InsufficientFunds { .. }));

    Ok(())
}

/// Toy 2-of-2 scheme: the key is the XOR of both shares
struct XorShares;

impl ShareReconstructor for XorShares {
    fn combine(&self, shares: &[String], network: Network) -> Result<SourceKey> {
        let mut key = [0u8; 32];
        for share in shares {
            let bytes = hex::decode(share)
                .map_err(|e| TransferError::Reconstruction(format!("Bad share: {}", e)))?;
            if bytes.len() != 32 {
                return Err(TransferError::Reconstruction("Share must be 32 bytes".to_string()));
            }
            for (k, b) in key.iter_mut().zip(bytes) {
                *k ^= b;
            }
        }
        SourceKey::parse(&hex::encode(key), network)
    }
}

#[tokio::test]
async fn test_transfer_from_shares() -> anyhow::Result<()> {
    let env = TestEnvironment::new().await?;
    env.ledger().fund_value(SOURCE_ADDRESS, 100_000)?;
    let orchestrator = env.orchestrator()?;

    // aa..aa XOR aa..ab = 00..01, the key behind SOURCE_ADDRESS
    let shares = vec!["aa".repeat(32), format!("{}ab", "aa".repeat(31))];

    let err = orchestrator
        .transfer_from_shares(
            &XorShares,
            &shares[..1],
            2,
            DESTINATION,
            TransferMode::Amount(30_000),
            Network::Main,
            FeeRate::NORMAL,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Reconstruction(_)));
    assert_eq!(env.ledger().request_count(), 0);

    let result = orchestrator
        .transfer_from_shares(
            &XorShares,
            &shares,
            2,
            DESTINATION,
            TransferMode::Amount(30_000),
            Network::Main,
            FeeRate::NORMAL,
        )
        .await?;
    assert_eq!(result.total_sent, 30_000);
    assert_eq!(env.ledger().broadcasts().len(), 1);

    Ok(())
}
