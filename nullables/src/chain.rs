//! Nullable chain: an in-memory block store with a single main chain.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use relay_chain::{Chain, ChainError, NullifierSet, VerificationReason};
use relay_types::{Block, BlockHash, BlockHeader, Nullifier, Spend, Transaction};

/// Reward paid by every miner's fee transaction.
pub const MINING_REWARD: i64 = 20;

struct State {
    blocks: HashMap<BlockHash, Block>,
    /// Main chain hashes; index 0 is genesis (sequence 1).
    main: Vec<BlockHash>,
    invalid: HashMap<BlockHash, VerificationReason>,
    nullifiers: HashMap<Nullifier, u64>,
}

/// An in-memory chain for testing.
/// Thread-safe for use with tokio's multi-threaded runtime.
pub struct NullChain {
    state: Mutex<State>,
    synced: AtomicBool,
    added: AtomicUsize,
}

impl NullChain {
    /// A chain holding only its genesis block, at sequence 1.
    pub fn new() -> Self {
        let transactions = vec![Transaction::miners_fee(1, MINING_REWARD)];
        let header = BlockHeader {
            sequence: 1,
            previous_block_hash: BlockHash::ZERO,
            note_tree_size: 1,
            nullifier_set_size: 0,
            transaction_commitment: Block::compute_transaction_commitment(&transactions),
            target: [0xFF; 32],
            randomness: 0,
            timestamp_ms: 1_700_000_000_000,
            graffiti: [0u8; 32],
        };
        let genesis = Block::new(header, transactions);
        let hash = genesis.hash();

        Self {
            state: Mutex::new(State {
                blocks: HashMap::from([(hash, genesis)]),
                main: vec![hash],
                invalid: HashMap::new(),
                nullifiers: HashMap::new(),
            }),
            synced: AtomicBool::new(true),
            added: AtomicUsize::new(0),
        }
    }

    /// A simple transaction with one spend and one note, distinct per seed.
    pub fn transaction(seed: u8) -> Transaction {
        Self::spending(seed, Nullifier::new([seed; 32]), 0)
    }

    /// A transaction spending `nullifier` against a note tree of
    /// `commitment_tree_size`. Different seeds give different hashes.
    pub fn spending(seed: u8, nullifier: Nullifier, commitment_tree_size: u64) -> Transaction {
        Transaction {
            version: Transaction::CURRENT_VERSION,
            fee: i64::from(seed) + 1,
            expiration: 0,
            spends: vec![Spend {
                nullifier,
                commitment_tree_size,
            }],
            notes: vec![[seed; 32]],
            signature: vec![seed; 8],
        }
    }

    /// Build (but do not append) a valid block on top of the head. The
    /// miner's fee is inserted at index 0.
    pub fn make_block(&self, transactions: Vec<Transaction>) -> Block {
        let head = self.head();
        let sequence = head.sequence + 1;
        let fees: i64 = transactions.iter().map(|tx| tx.fee).sum();

        let mut all = Vec::with_capacity(transactions.len() + 1);
        all.push(Transaction::miners_fee(sequence, MINING_REWARD + fees));
        all.extend(transactions);

        let notes: usize = all.iter().map(|tx| tx.notes.len()).sum();
        let spends: usize = all.iter().map(|tx| tx.spends.len()).sum();
        let header = BlockHeader {
            sequence,
            previous_block_hash: head.hash(),
            note_tree_size: head.note_tree_size + notes as u64,
            nullifier_set_size: head.nullifier_set_size + spends as u64,
            transaction_commitment: Block::compute_transaction_commitment(&all),
            target: head.target,
            randomness: sequence,
            timestamp_ms: head.timestamp_ms + 60_000,
            graffiti: [0u8; 32],
        };
        Block::new(header, all)
    }

    /// Append a block to the main chain without any checks.
    pub fn append(&self, block: Block) {
        let mut state = self.state.lock().unwrap();
        let tree_size = state
            .main
            .last()
            .and_then(|h| state.blocks.get(h))
            .map_or(0, |b| b.header.note_tree_size);
        for nullifier in block.transactions.iter().flat_map(|tx| tx.nullifiers()) {
            state.nullifiers.entry(*nullifier).or_insert(tree_size);
        }
        let hash = block.hash();
        state.main.push(hash);
        state.blocks.insert(hash, block);
    }

    /// Main-chain block at `sequence`.
    pub fn block_at(&self, sequence: u64) -> Option<Block> {
        let state = self.state.lock().unwrap();
        let index = usize::try_from(sequence.checked_sub(1)?).ok()?;
        state.main.get(index).and_then(|h| state.blocks.get(h)).cloned()
    }

    pub fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::SeqCst);
    }

    /// How many blocks were appended through [`Chain::add_block`].
    pub fn added_count(&self) -> usize {
        self.added.load(Ordering::SeqCst)
    }
}

impl Default for NullChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Chain for NullChain {
    fn has_block(&self, hash: &BlockHash) -> bool {
        self.state.lock().unwrap().blocks.contains_key(hash)
    }

    fn get_block(&self, hash: &BlockHash) -> Option<Block> {
        self.state.lock().unwrap().blocks.get(hash).cloned()
    }

    fn head(&self) -> BlockHeader {
        let state = self.state.lock().unwrap();
        let head = state.main.last().expect("genesis is always present");
        state.blocks[head].header.clone()
    }

    fn genesis(&self) -> BlockHeader {
        let state = self.state.lock().unwrap();
        state.blocks[&state.main[0]].header.clone()
    }

    fn is_invalid(&self, hash: &BlockHash) -> Option<VerificationReason> {
        self.state.lock().unwrap().invalid.get(hash).copied()
    }

    fn add_invalid(&self, hash: BlockHash, reason: VerificationReason) {
        self.state.lock().unwrap().invalid.insert(hash, reason);
    }

    fn synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    async fn add_block(&self, block: Block) -> Result<(), ChainError> {
        let hash = block.hash();
        if self.has_block(&hash) {
            return Err(ChainError::Duplicate(hash));
        }
        let previous = block.header.previous_block_hash;
        if self.head().hash() != previous {
            return Err(ChainError::Orphan(previous));
        }
        self.append(block);
        self.added.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl NullifierSet for NullChain {
    fn committed_at(&self, nullifier: &Nullifier) -> Option<u64> {
        self.state.lock().unwrap().nullifiers.get(nullifier).copied()
    }

    fn note_tree_size(&self) -> u64 {
        self.head().note_tree_size
    }
}
