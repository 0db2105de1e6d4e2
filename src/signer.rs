//! P2PKH signing with the BSV fork-id sighash
//!
//! Every input is signed with `SIGHASH_ALL | FORKID` over the BIP-143 style
//! preimage and unlocked with `<sig> <pubkey>`. The signer refuses any input
//! whose locking script is not the P2PKH script of the signing key.

use bitcoin::blockdata::script::{Builder, Instruction, PushBytesBuf};
use bitcoin::consensus::encode::{deserialize, serialize, serialize_hex};
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::secp256k1::{ecdsa, Message, Secp256k1, Signing, Verification};
use bitcoin::{PrivateKey, PublicKey, ScriptBuf, Transaction};

use crate::builder::TransactionDraft;
use crate::error::TransferError;
use crate::keys::SourceKey;
use crate::Result;

/// `SIGHASH_ALL | SIGHASH_FORKID`
pub const SIGHASH_ALL_FORKID: u32 = 0x41;

/// Fully signed transaction ready for broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub raw_hex: String,
    pub txid: String,
}

impl SignedTransaction {
    pub fn from_transaction(transaction: Transaction) -> Self {
        let raw_hex = serialize_hex(&transaction);
        let txid = transaction.compute_txid().to_string();
        Self {
            transaction,
            raw_hex,
            txid,
        }
    }

    /// Decode raw transaction hex as produced by [`SignedTransaction::raw_hex`]
    pub fn parse(raw_hex: &str) -> Result<Self> {
        let bytes = hex::decode(raw_hex.trim())
            .map_err(|e| TransferError::InvalidRequest(format!("Invalid transaction hex: {}", e)))?;
        let transaction: Transaction = deserialize(&bytes).map_err(|e| {
            TransferError::InvalidRequest(format!("Invalid transaction encoding: {}", e))
        })?;
        Ok(Self::from_transaction(transaction))
    }
}

/// Fork-id signature hash of `input_index`.
///
/// Preimage = version || hashPrevouts || hashSequence || outpoint ||
/// scriptCode || value || nSequence || hashOutputs || locktime || sighashType
pub fn forkid_sighash(
    tx: &Transaction,
    input_index: usize,
    script_code: &ScriptBuf,
    value: u64,
) -> Result<[u8; 32]> {
    let input = tx.input.get(input_index).ok_or_else(|| {
        TransferError::signing(format!(
            "Input index {} out of range ({} inputs)",
            input_index,
            tx.input.len()
        ))
    })?;

    let mut prevouts = Vec::with_capacity(tx.input.len() * 36);
    let mut sequences = Vec::with_capacity(tx.input.len() * 4);
    for txin in &tx.input {
        prevouts.extend(serialize(&txin.previous_output));
        sequences.extend(serialize(&txin.sequence));
    }
    let mut outputs = Vec::new();
    for txout in &tx.output {
        outputs.extend(serialize(txout));
    }

    let mut preimage = Vec::new();
    preimage.extend(serialize(&tx.version));
    preimage.extend(sha256d::Hash::hash(&prevouts).to_byte_array());
    preimage.extend(sha256d::Hash::hash(&sequences).to_byte_array());
    preimage.extend(serialize(&input.previous_output));
    preimage.extend(serialize(script_code));
    preimage.extend(value.to_le_bytes());
    preimage.extend(serialize(&input.sequence));
    preimage.extend(sha256d::Hash::hash(&outputs).to_byte_array());
    preimage.extend(serialize(&tx.lock_time));
    preimage.extend(SIGHASH_ALL_FORKID.to_le_bytes());

    Ok(sha256d::Hash::hash(&preimage).to_byte_array())
}

/// Sign every input of `draft` with `key`
pub fn sign_draft<C: Signing>(
    secp: &Secp256k1<C>,
    draft: &TransactionDraft,
    key: &SourceKey,
) -> Result<SignedTransaction> {
    if !draft.is_balanced() {
        return Err(TransferError::signing(format!(
            "Draft does not balance: inputs {} != outputs {} + fee {}",
            draft.input_total(),
            draft.output_total(),
            draft.fee
        )));
    }

    let mut private_key = key.private_key()?;
    let signed = sign_inputs(secp, draft, &private_key);
    private_key.inner.non_secure_erase();
    signed
}

fn sign_inputs<C: Signing>(
    secp: &Secp256k1<C>,
    draft: &TransactionDraft,
    private_key: &PrivateKey,
) -> Result<SignedTransaction> {
    let public_key = PublicKey::from_private_key(secp, private_key);
    let expected_script = ScriptBuf::new_p2pkh(&public_key.pubkey_hash());

    let mut tx = draft.to_unsigned_transaction()?;
    let mut script_sigs = Vec::with_capacity(draft.inputs.len());

    for (index, input) in draft.inputs.iter().enumerate() {
        if input.locking_script != expected_script {
            return Err(TransferError::signing(format!(
                "Key cannot unlock input {}:{} (locking script {} does not match key)",
                input.utxo.txid,
                input.utxo.vout,
                input.locking_script.to_hex_string()
            )));
        }

        let digest = forkid_sighash(&tx, index, &input.locking_script, input.utxo.value)?;
        let signature = secp.sign_ecdsa(&Message::from_digest(digest), &private_key.inner);

        let mut sig_bytes = signature.serialize_der().to_vec();
        sig_bytes.push(SIGHASH_ALL_FORKID as u8);
        let sig_push = PushBytesBuf::try_from(sig_bytes)
            .map_err(|e| TransferError::signing(format!("Signature push failed: {:?}", e)))?;

        script_sigs.push(
            Builder::new()
                .push_slice(sig_push)
                .push_key(&public_key)
                .into_script(),
        );
    }

    for (txin, script_sig) in tx.input.iter_mut().zip(script_sigs) {
        txin.script_sig = script_sig;
    }

    Ok(SignedTransaction::from_transaction(tx))
}

/// Check the P2PKH unlocking script of `input_index` against its spent output
pub fn verify_input<C: Verification>(
    secp: &Secp256k1<C>,
    tx: &Transaction,
    input_index: usize,
    locking_script: &ScriptBuf,
    value: u64,
) -> Result<()> {
    let input = tx
        .input
        .get(input_index)
        .ok_or_else(|| TransferError::signing(format!("No input {}", input_index)))?;

    let pushes = input
        .script_sig
        .instructions()
        .map(|ins| match ins {
            Ok(Instruction::PushBytes(bytes)) => Ok(bytes.as_bytes().to_vec()),
            _ => Err(TransferError::signing("Unlocking script is not push-only")),
        })
        .collect::<Result<Vec<_>>>()?;

    let [sig_bytes, key_bytes] = pushes.as_slice() else {
        return Err(TransferError::signing(format!(
            "Expected <sig> <pubkey>, found {} pushes",
            pushes.len()
        )));
    };

    let (hash_type, der) = sig_bytes
        .split_last()
        .ok_or_else(|| TransferError::signing("Empty signature"))?;
    if u32::from(*hash_type) != SIGHASH_ALL_FORKID {
        return Err(TransferError::signing(format!(
            "Unexpected sighash type 0x{:02x}",
            hash_type
        )));
    }

    let public_key = PublicKey::from_slice(key_bytes)
        .map_err(|e| TransferError::signing(format!("Invalid public key: {}", e)))?;
    if ScriptBuf::new_p2pkh(&public_key.pubkey_hash()) != *locking_script {
        return Err(TransferError::signing("Public key does not match locking script"));
    }

    let signature = ecdsa::Signature::from_der(der)
        .map_err(|e| TransferError::signing(format!("Invalid DER signature: {}", e)))?;
    let digest = forkid_sighash(tx, input_index, locking_script, value)?;

    secp.verify_ecdsa(&Message::from_digest(digest), &signature, &public_key.inner)
        .map_err(|e| TransferError::signing(format!("Signature check failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{TransactionBuilder, TransferMode};
    use crate::fees::FeeRate;
    use crate::network::Network;
    use crate::utxo::Utxo;

    const DEST: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";

    fn test_key() -> SourceKey {
        SourceKey::parse(&"11".repeat(32), Network::Main).unwrap()
    }

    fn funded_draft(key: &SourceKey, values: &[u64], mode: TransferMode) -> TransactionDraft {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_private_key(&secp, &key.private_key().unwrap());
        let address = bitcoin::Address::p2pkh(public_key.pubkey_hash(), bitcoin::Network::Bitcoin);
        let utxos: Vec<Utxo> = values
            .iter()
            .enumerate()
            .map(|(i, value)| Utxo {
                txid: format!("{:064x}", i + 1),
                vout: i as u32,
                value: *value,
                locking_script_hex: Some(address.script_pubkey().to_hex_string()),
            })
            .collect();

        TransactionBuilder::new(Network::Main, FeeRate::new(1.0).unwrap())
            .build(&utxos, &address.to_string(), DEST, mode)
            .unwrap()
    }

    #[test]
    fn test_signed_round_trip_preserves_values() {
        let key = test_key();
        let draft = funded_draft(&key, &[40_000, 60_000], TransferMode::Amount(25_000));
        let signed = sign_draft(&Secp256k1::new(), &draft, &key).unwrap();

        let reparsed = SignedTransaction::parse(&signed.raw_hex).unwrap();
        assert_eq!(reparsed.txid, signed.txid);
        assert_eq!(reparsed.transaction.input.len(), draft.inputs.len());

        let values: Vec<u64> = reparsed
            .transaction
            .output
            .iter()
            .map(|o| o.value.to_sat())
            .collect();
        let expected: Vec<u64> = draft.outputs.iter().map(|o| o.value).collect();
        assert_eq!(values, expected);

        for (txin, input) in reparsed.transaction.input.iter().zip(&draft.inputs) {
            assert_eq!(txin.previous_output, input.utxo.outpoint().unwrap());
        }
    }

    #[test]
    fn test_every_input_verifies() {
        let key = test_key();
        let draft = funded_draft(&key, &[10_000, 20_000, 30_000], TransferMode::Sweep);
        let secp = Secp256k1::new();
        let signed = sign_draft(&secp, &draft, &key).unwrap();

        for (index, input) in draft.inputs.iter().enumerate() {
            verify_input(
                &secp,
                &signed.transaction,
                index,
                &input.locking_script,
                input.utxo.value,
            )
            .unwrap();
        }

        // Wrong spent value invalidates the signature
        assert!(verify_input(
            &secp,
            &signed.transaction,
            0,
            &draft.inputs[0].locking_script,
            draft.inputs[0].utxo.value + 1,
        )
        .is_err());
    }

    #[test]
    fn test_mismatched_script_fails() {
        let key = test_key();
        let mut draft = funded_draft(&key, &[50_000], TransferMode::Sweep);
        draft.inputs[0].locking_script = ScriptBuf::new_p2pkh(&bitcoin::PubkeyHash::all_zeros());

        let err = sign_draft(&Secp256k1::new(), &draft, &key).unwrap_err();
        assert!(matches!(err, TransferError::Signing(_)));
    }

    #[test]
    fn test_unbalanced_draft_refused() {
        let key = test_key();
        let mut draft = funded_draft(&key, &[50_000], TransferMode::Sweep);
        draft.fee += 1;
        assert!(sign_draft(&Secp256k1::new(), &draft, &key).is_err());
    }

    #[test]
    fn test_sighash_depends_on_input_index() {
        let key = test_key();
        let draft = funded_draft(&key, &[1_000, 1_000], TransferMode::Sweep);
        let tx = draft.to_unsigned_transaction().unwrap();
        let script = &draft.inputs[0].locking_script;

        let first = forkid_sighash(&tx, 0, script, 1_000).unwrap();
        let second = forkid_sighash(&tx, 1, script, 1_000).unwrap();
        assert_ne!(first, second);
        assert!(forkid_sighash(&tx, 2, script, 1_000).is_err());
    }
}
