//! Regtest consensus details the harness needs on top of the `bitcoin`
//! crate: subsidy schedule, coinbase layout and block templates.

use bitcoin::absolute::LockTime;
use bitcoin::address::NetworkUnchecked;
use bitcoin::address::ParseError;
use bitcoin::block::Header;
use bitcoin::block::Version;
use bitcoin::hashes::Hash;
use bitcoin::opcodes::all::OP_RETURN;
use bitcoin::opcodes::OP_0;
use bitcoin::script::Builder;
use bitcoin::transaction;
use bitcoin::Address;
use bitcoin::Amount;
use bitcoin::Block;
use bitcoin::CompactTarget;
use bitcoin::Network;
use bitcoin::OutPoint;
use bitcoin::ScriptBuf;
use bitcoin::Sequence;
use bitcoin::Transaction;
use bitcoin::TxIn;
use bitcoin::TxMerkleNode;
use bitcoin::TxOut;
use bitcoin::Witness;

/// Regtest halves the block subsidy every 150 blocks.
pub const REGTEST_HALVING_INTERVAL: u64 = 150;

const INITIAL_SUBSIDY: Amount = Amount::from_sat(50 * 100_000_000);

const SIGN_BIT: u32 = 0x0080_0000;
const MANTISSA_MASK: u32 = 0x007f_ffff;

/// Prefix of the coinbase output that commits to the block's witnesses
/// (BIP141).
const WITNESS_COMMITMENT_HEADER: [u8; 4] = [0xaa, 0x21, 0xa9, 0xed];
const WITNESS_RESERVED_VALUE: [u8; 32] = [0; 32];

/// Block subsidy paid by the coinbase of the block at `height`.
pub fn regtest_block_subsidy(height: u64) -> Amount {
    let halvings = height / REGTEST_HALVING_INTERVAL;
    if halvings >= 64 {
        return Amount::ZERO;
    }
    Amount::from_sat(INITIAL_SUBSIDY.to_sat() >> halvings)
}

/// Parses `address` and checks that it is usable on regtest.
pub fn regtest_address(address: &str) -> Result<Address, ParseError> {
    address
        .parse::<Address<NetworkUnchecked>>()?
        .require_network(Network::Regtest)
}

/// A coinbase transaction for the block at `height`.
///
/// The input script commits to the height (BIP34) followed by `OP_0` and
/// `extra_nonce`, which keeps coinbase ids distinct between sibling blocks
/// paying the same recipient.
pub fn coinbase_transaction(
    height: u64,
    value: Amount,
    recipient: ScriptBuf,
    extra_nonce: u32,
) -> Transaction {
    // heights stay far below i64::MAX
    let script_sig = Builder::new()
        .push_int(height as i64)
        .push_opcode(OP_0)
        .push_int(i64::from(extra_nonce))
        .into_script();

    Transaction {
        version: transaction::Version::ONE,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig,
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value,
            script_pubkey: recipient,
        }],
    }
}

/// A block extending `parent` (at `parent_height`) that contains only a
/// coinbase paying the regtest subsidy for the new height to `recipient`.
///
/// Difficulty bits are inherited and the timestamp is one second after the
/// parent's. The nonce is left at zero and the merkle root is already
/// consistent with the coinbase.
pub fn next_block_with_coinbase(
    parent: &Block,
    parent_height: u64,
    recipient: ScriptBuf,
    extra_nonce: u32,
) -> Block {
    let height = parent_height + 1;
    let coinbase =
        coinbase_transaction(height, regtest_block_subsidy(height), recipient, extra_nonce);

    let mut block = Block {
        header: Header {
            version: Version::NO_SOFT_FORK_SIGNALLING,
            prev_blockhash: parent.block_hash(),
            merkle_root: TxMerkleNode::all_zeros(),
            time: parent.header.time + 1,
            bits: parent.header.bits,
            nonce: 0,
        },
        txdata: vec![coinbase],
    };
    update_merkle_root(&mut block);
    block
}

/// Must be called after any change to the block's transaction list.
///
/// Rebuilds the coinbase's witness commitment when a transaction carries
/// witness data, then recomputes the merkle root.
pub fn update_merkle_root(block: &mut Block) {
    commit_to_witnesses(block);
    if let Some(root) = block.compute_merkle_root() {
        block.header.merkle_root = root;
    }
}

fn commit_to_witnesses(block: &mut Block) {
    let has_witness = block
        .txdata
        .iter()
        .skip(1)
        .any(|tx| tx.input.iter().any(|input| !input.witness.is_empty()));

    let Some(coinbase) = block.txdata.first_mut() else {
        return;
    };
    coinbase
        .output
        .retain(|output| !is_witness_commitment(&output.script_pubkey));
    for input in &mut coinbase.input {
        input.witness = Witness::new();
    }
    if !has_witness {
        return;
    }

    // the coinbase's own wtxid counts as zero, so its witness can be set first
    for input in &mut coinbase.input {
        input.witness = Witness::from_slice(&[WITNESS_RESERVED_VALUE]);
    }
    let Some(witness_root) = block.witness_root() else {
        return;
    };
    let commitment = Block::compute_witness_commitment(&witness_root, &WITNESS_RESERVED_VALUE);

    let mut payload = [0u8; 36];
    payload[..4].copy_from_slice(&WITNESS_COMMITMENT_HEADER);
    payload[4..].copy_from_slice(commitment.as_byte_array());
    let script_pubkey = Builder::new()
        .push_opcode(OP_RETURN)
        .push_slice(payload)
        .into_script();

    if let Some(coinbase) = block.txdata.first_mut() {
        coinbase.output.push(TxOut {
            value: Amount::ZERO,
            script_pubkey,
        });
    }
}

fn is_witness_commitment(script: &bitcoin::Script) -> bool {
    let bytes = script.as_bytes();
    bytes.len() >= 38
        && bytes[0] == OP_RETURN.to_u8()
        && bytes[1] == 36
        && bytes[2..6] == WITNESS_COMMITMENT_HEADER
}

/// False for difficulty bits the node rejects: negative, zero, or
/// overflowing 256 bits.
pub fn is_valid_compact_target(bits: CompactTarget) -> bool {
    let raw = bits.to_consensus();
    let exponent = raw >> 24;
    let mantissa = raw & MANTISSA_MASK;

    if mantissa != 0 && raw & SIGN_BIT != 0 {
        return false;
    }
    let overflows = mantissa != 0
        && (exponent > 34
            || (mantissa > 0xff && exponent > 33)
            || (mantissa > 0xffff && exponent > 32));
    if overflows {
        return false;
    }

    if exponent <= 3 {
        mantissa >> (8 * (3 - exponent)) != 0
    } else {
        mantissa != 0
    }
}

/// True if the header's hash meets the target its own bits encode.
pub fn check_proof_of_work(header: &Header) -> bool {
    is_valid_compact_target(header.bits) && header.validate_pow(header.target()).is_ok()
}
