use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::crypto::{Ed25519Verifier, Signer, Verifier};
use crate::error::{LedgerError, Result};
use crate::pow::{self, CancelToken};
use crate::{now_secs, Block, Transaction};

/// Serializable view of a chain, as published to and fetched from peers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub length: usize,
    pub chain: Vec<Block>,
}

impl ChainSnapshot {
    pub fn new(chain: Vec<Block>) -> Self {
        Self {
            length: chain.len(),
            chain,
        }
    }
}

/// A single replica: the block sequence, the pending pool and known peers.
///
/// Every chain observed through this type satisfies the link invariant: each
/// block after genesis references its predecessor's hash and re-hashes to its
/// stored hash.
#[derive(Clone)]
pub struct Ledger {
    chain: Vec<Block>,
    pending: Vec<Transaction>,
    peers: BTreeSet<String>,
    config: LedgerConfig,
    verifier: Arc<dyn Verifier>,
}

impl Ledger {
    pub fn new(config: LedgerConfig) -> Result<Self> {
        Self::with_verifier(config, Arc::new(Ed25519Verifier))
    }

    pub fn with_verifier(config: LedgerConfig, verifier: Arc<dyn Verifier>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            chain: vec![Self::create_genesis_block()],
            pending: Vec::new(),
            peers: BTreeSet::new(),
            config,
            verifier,
        })
    }

    /// Restores a ledger from previously persisted blocks.
    pub fn from_chain(config: LedgerConfig, chain: Vec<Block>) -> Result<Self> {
        let mut ledger = Self::new(config)?;
        ledger.validate_chain(&chain)?;
        ledger.chain = chain;
        Ok(ledger)
    }

    pub fn create_genesis_block() -> Block {
        Block::genesis()
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn last_block(&self) -> &Block {
        // The chain is never empty: construction pushes genesis and
        // replacements are only accepted after validation.
        &self.chain[self.chain.len() - 1]
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn verifier(&self) -> &dyn Verifier {
        self.verifier.as_ref()
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot::new(self.chain.clone())
    }

    /// Builds, signs and pools a transfer. Rejected transactions leave the
    /// pool untouched.
    pub fn add_transaction(
        &mut self,
        sender: &str,
        recipient: &str,
        amount: u64,
        signer: &dyn Signer,
    ) -> Result<()> {
        let mut tx = Transaction::new(sender, recipient, amount);
        tx.sign(signer)?;
        self.submit_transaction(tx)
    }

    /// Pools a transaction that was signed elsewhere.
    pub fn submit_transaction(&mut self, tx: Transaction) -> Result<()> {
        if !tx.is_valid(self.verifier.as_ref()) {
            warn!(sender = %tx.sender, "rejected transaction with bad or missing signature");
            return Err(LedgerError::InvalidTransaction(format!(
                "signature check failed for transaction {}",
                tx.content_hash()
            )));
        }
        debug!(
            sender = %tx.sender,
            recipient = %tx.recipient,
            amount = tx.amount,
            "transaction pooled"
        );
        self.pending.push(tx);
        Ok(())
    }

    pub fn mine_pending_transactions(&mut self, miner: &str) -> Result<usize> {
        self.mine_pending_transactions_with(miner, &CancelToken::new())
    }

    /// Seals the pool into blocks of at most `block_size` transactions, each
    /// chained to the one mined before it, then resets the pool to a single
    /// reward for `miner`. Returns the number of blocks appended.
    ///
    /// Nothing is mutated unless every batch is mined, so a cancelled run
    /// leaves both chain and pool as they were.
    pub fn mine_pending_transactions_with(
        &mut self,
        miner: &str,
        cancel: &CancelToken,
    ) -> Result<usize> {
        let required = self.config.min_pending_transactions;
        if self.pending.len() < required {
            return Err(LedgerError::InsufficientPendingTransactions {
                pending: self.pending.len(),
                required,
            });
        }

        let mut mined: Vec<Block> = Vec::new();
        for batch in self.pending.chunks(self.config.block_size) {
            let prev_hash = match mined.last() {
                Some(block) => block.hash.clone(),
                None => self.last_block().hash.clone(),
            };
            let index = (self.chain.len() + mined.len()) as u64;
            let block = Block::new(batch.to_vec(), now_secs(), prev_hash, index);
            let block = if self.config.parallel_mining {
                pow::mine_parallel(block, self.config.difficulty, cancel)?
            } else {
                let mut block = block;
                block.mine_with(self.config.difficulty, cancel)?;
                block
            };
            mined.push(block);
        }

        let count = mined.len();
        self.chain.extend(mined);
        self.pending = vec![Transaction::issuance(miner, self.config.mining_reward)];
        info!(
            blocks = count,
            height = self.chain.len() - 1,
            miner,
            "mined pending transactions"
        );
        Ok(count)
    }

    /// Net amount received by `principal` over the whole chain.
    pub fn get_balance(&self, principal: &str) -> i128 {
        let mut balance: i128 = 0;
        for tx in self.chain.iter().flat_map(|block| &block.transactions) {
            if tx.recipient == principal {
                balance += i128::from(tx.amount);
            }
            if tx.sender == principal {
                balance -= i128::from(tx.amount);
            }
        }
        balance
    }

    pub fn is_valid_chain(&self, chain: &[Block]) -> bool {
        match self.validate_chain(chain) {
            Ok(()) => true,
            Err(err) => {
                debug!("chain rejected: {err}");
                false
            }
        }
    }

    /// Checks every block after genesis for position, hash integrity, linkage
    /// and transaction signatures, reporting the first violation.
    pub fn validate_chain(&self, chain: &[Block]) -> Result<()> {
        let Some(genesis) = chain.first() else {
            return Err(LedgerError::InvalidChain {
                index: 0,
                reason: "missing genesis block".into(),
            });
        };
        if genesis.index != 0 {
            return Err(out_of_sequence(0));
        }
        for (i, pair) in chain.windows(2).enumerate() {
            let (prev, block) = (&pair[0], &pair[1]);
            let index = i + 1;
            // Stores key blocks by `index`, which the hash does not cover.
            if block.index != index as u64 {
                return Err(out_of_sequence(index));
            }
            if block.hash != block.calculate_hash() {
                return Err(LedgerError::InvalidChain {
                    index,
                    reason: "stored hash does not match contents".into(),
                });
            }
            if block.prev_hash != prev.hash {
                return Err(LedgerError::InvalidChain {
                    index,
                    reason: "previous hash does not match predecessor".into(),
                });
            }
            if !block.has_valid_transactions(self.verifier.as_ref()) {
                return Err(LedgerError::InvalidChain {
                    index,
                    reason: "contains an invalid transaction".into(),
                });
            }
        }
        Ok(())
    }

    /// Records a peer by its network location. Accepts `host:port` or a URL.
    pub fn register_peer(&mut self, address: &str) -> Result<String> {
        let location = peer_location(address)?;
        if self.peers.insert(location.clone()) {
            info!(peer = %location, "registered peer");
        }
        Ok(location)
    }

    pub fn peers(&self) -> &BTreeSet<String> {
        &self.peers
    }

    pub(crate) fn replace_chain(&mut self, chain: Vec<Block>) {
        self.chain = chain;
    }
}

fn out_of_sequence(index: usize) -> LedgerError {
    LedgerError::InvalidChain {
        index,
        reason: "index out of sequence".into(),
    }
}

fn peer_location(address: &str) -> Result<String> {
    let trimmed = address.trim();
    let without_scheme = match trimmed.split_once("://") {
        Some((_, rest)) => rest,
        None => trimmed,
    };
    let location = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    if location.is_empty() {
        return Err(LedgerError::InvalidPeer(address.to_string()));
    }
    Ok(location.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Ed25519Signer;

    fn easy_config() -> LedgerConfig {
        LedgerConfig {
            difficulty: 1,
            ..Default::default()
        }
    }

    #[test]
    fn genesis_only_ledger() {
        let ledger = Ledger::new(LedgerConfig::default()).unwrap();
        assert_eq!(ledger.len(), 1);
        assert!(ledger.pending().is_empty());
        assert_eq!(ledger.chain()[0].prev_hash, "0");
        assert_eq!(ledger.get_balance("Alice"), 0);
        assert!(ledger.is_valid_chain(ledger.chain()));
    }

    #[test]
    fn rejects_invalid_config() {
        let config = LedgerConfig {
            block_size: 0,
            ..Default::default()
        };
        assert!(Ledger::new(config).is_err());
    }

    #[test]
    fn add_transaction_rejects_mismatched_sender() {
        let mut ledger = Ledger::new(easy_config()).unwrap();
        let signer = Ed25519Signer::from_bytes(&[1u8; 32]);
        let err = ledger
            .add_transaction("Alice", "Bob", 10, &signer)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransaction(_)));
        assert!(ledger.pending().is_empty());
    }

    #[test]
    fn add_transaction_accepts_signed_and_issuance() {
        let mut ledger = Ledger::new(easy_config()).unwrap();
        let signer = Ed25519Signer::from_bytes(&[1u8; 32]);
        ledger
            .add_transaction(&signer.identity(), "Bob", 10, &signer)
            .unwrap();
        ledger
            .add_transaction(crate::SYSTEM_ISSUER, "Bob", 5, &signer)
            .unwrap();
        assert_eq!(ledger.pending().len(), 2);
    }

    #[test]
    fn mining_requires_minimum_pool() {
        let mut ledger = Ledger::new(easy_config()).unwrap();
        let err = ledger.mine_pending_transactions("miner").unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientPendingTransactions {
                pending: 0,
                required: 2
            }
        ));

        ledger
            .submit_transaction(Transaction::issuance("Bob", 1))
            .unwrap();
        assert!(ledger.mine_pending_transactions("miner").is_err());
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.pending().len(), 1);
    }

    #[test]
    fn minimum_pool_is_configurable() {
        let mut ledger = Ledger::new(LedgerConfig {
            min_pending_transactions: 1,
            ..easy_config()
        })
        .unwrap();
        ledger
            .submit_transaction(Transaction::issuance("Bob", 1))
            .unwrap();
        assert_eq!(ledger.mine_pending_transactions("miner").unwrap(), 1);
    }

    #[test]
    fn mining_batches_by_block_size() {
        let mut ledger = Ledger::new(LedgerConfig {
            block_size: 2,
            ..easy_config()
        })
        .unwrap();
        for i in 0..5 {
            ledger
                .submit_transaction(Transaction::issuance(format!("user{i}"), i))
                .unwrap();
        }
        let mined = ledger.mine_pending_transactions("miner").unwrap();
        assert_eq!(mined, 3);
        assert_eq!(ledger.len(), 4);
        let sizes: Vec<usize> = ledger.chain()[1..]
            .iter()
            .map(|b| b.transactions.len())
            .collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        for (i, pair) in ledger.chain().windows(2).enumerate() {
            assert_eq!(pair[1].prev_hash, pair[0].hash);
            assert_eq!(pair[1].index, (i + 1) as u64);
        }
        assert!(ledger.is_valid_chain(ledger.chain()));
    }

    #[test]
    fn mining_resets_pool_to_reward() {
        let mut ledger = Ledger::new(easy_config()).unwrap();
        ledger
            .submit_transaction(Transaction::issuance("a", 1))
            .unwrap();
        ledger
            .submit_transaction(Transaction::issuance("b", 1))
            .unwrap();
        ledger.mine_pending_transactions("miner").unwrap();
        assert_eq!(ledger.pending().len(), 1);
        let reward = &ledger.pending()[0];
        assert!(reward.is_issuance());
        assert_eq!(reward.recipient, "miner");
        assert_eq!(reward.amount, 50);
        // The reward is not on chain until the next round.
        assert_eq!(ledger.get_balance("miner"), 0);
    }

    #[test]
    fn cancelled_mining_leaves_state_untouched() {
        let mut ledger = Ledger::new(LedgerConfig {
            difficulty: 64,
            ..Default::default()
        })
        .unwrap();
        ledger
            .submit_transaction(Transaction::issuance("a", 1))
            .unwrap();
        ledger
            .submit_transaction(Transaction::issuance("b", 1))
            .unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = ledger
            .mine_pending_transactions_with("miner", &cancel)
            .unwrap_err();
        assert!(matches!(err, LedgerError::MiningCancelled));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.pending().len(), 2);
    }

    #[test]
    fn parallel_mining_produces_valid_chain() {
        let mut ledger = Ledger::new(LedgerConfig {
            difficulty: 2,
            parallel_mining: true,
            ..Default::default()
        })
        .unwrap();
        ledger
            .submit_transaction(Transaction::issuance("a", 1))
            .unwrap();
        ledger
            .submit_transaction(Transaction::issuance("b", 1))
            .unwrap();
        ledger.mine_pending_transactions("miner").unwrap();
        assert!(ledger.last_block().hash.starts_with("00"));
        assert!(ledger.is_valid_chain(ledger.chain()));
    }

    #[test]
    fn balance_nets_self_transfer_to_zero() {
        let mut ledger = Ledger::new(easy_config()).unwrap();
        let signer = Ed25519Signer::from_bytes(&[2u8; 32]);
        let me = signer.identity();
        ledger.add_transaction(&me, &me, 7, &signer).unwrap();
        ledger
            .submit_transaction(Transaction::issuance(&me, 3))
            .unwrap();
        ledger.mine_pending_transactions("miner").unwrap();
        assert_eq!(ledger.get_balance(&me), 3);
    }

    #[test]
    fn validate_chain_reports_index() {
        let mut ledger = Ledger::new(easy_config()).unwrap();
        ledger
            .submit_transaction(Transaction::issuance("a", 1))
            .unwrap();
        ledger
            .submit_transaction(Transaction::issuance("b", 1))
            .unwrap();
        ledger.mine_pending_transactions("miner").unwrap();

        let mut tampered = ledger.chain().to_vec();
        tampered[1].transactions[0].amount = 1_000;
        match ledger.validate_chain(&tampered) {
            Err(LedgerError::InvalidChain { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected InvalidChain, got {other:?}"),
        }
        assert!(!ledger.is_valid_chain(&[]));
    }

    #[test]
    fn validate_chain_rejects_broken_link() {
        let ledger = Ledger::new(easy_config()).unwrap();
        let mut orphan = Block::new(vec![], 1, "not-the-genesis-hash", 1);
        orphan.mine(1);
        let chain = vec![ledger.chain()[0].clone(), orphan];
        assert!(!ledger.is_valid_chain(&chain));
    }

    #[test]
    fn validate_chain_rejects_out_of_sequence_index() {
        let mut ledger = Ledger::new(easy_config()).unwrap();
        for round in 0..2 {
            ledger
                .submit_transaction(Transaction::issuance(format!("a{round}"), 1))
                .unwrap();
            ledger
                .submit_transaction(Transaction::issuance(format!("b{round}"), 1))
                .unwrap();
            ledger.mine_pending_transactions("miner").unwrap();
        }
        assert_eq!(ledger.len(), 3);

        // Hashes and links stay intact; only the positions lie.
        let mut collapsed = ledger.chain().to_vec();
        for block in &mut collapsed {
            block.index = 0;
        }
        match ledger.validate_chain(&collapsed) {
            Err(LedgerError::InvalidChain { index, reason }) => {
                assert_eq!(index, 1);
                assert_eq!(reason, "index out of sequence");
            }
            other => panic!("expected InvalidChain, got {other:?}"),
        }

        let mut shifted = ledger.chain().to_vec();
        shifted[0].index = 7;
        assert!(!ledger.is_valid_chain(&shifted));
    }

    #[test]
    fn validate_chain_rejects_unsigned_transaction() {
        let ledger = Ledger::new(easy_config()).unwrap();
        let genesis = ledger.chain()[0].clone();
        let forged = Transaction::new("Alice", "Mallory", 100);
        let mut block = Block::new(vec![forged], 1, genesis.hash.clone(), 1);
        block.mine(1);
        assert!(!ledger.is_valid_chain(&[genesis, block]));
    }

    #[test]
    fn from_chain_restores_valid_blocks() {
        let mut ledger = Ledger::new(easy_config()).unwrap();
        ledger
            .submit_transaction(Transaction::issuance("a", 1))
            .unwrap();
        ledger
            .submit_transaction(Transaction::issuance("b", 1))
            .unwrap();
        ledger.mine_pending_transactions("miner").unwrap();

        let restored = Ledger::from_chain(easy_config(), ledger.chain().to_vec()).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.get_balance("a"), 1);

        let mut broken = ledger.chain().to_vec();
        broken[1].nonce += 1;
        assert!(Ledger::from_chain(easy_config(), broken).is_err());
    }

    #[test]
    fn register_peer_normalizes_addresses() {
        let mut ledger = Ledger::new(easy_config()).unwrap();
        assert_eq!(
            ledger.register_peer("http://127.0.0.1:5001/chain").unwrap(),
            "127.0.0.1:5001"
        );
        assert_eq!(ledger.register_peer("127.0.0.1:5001").unwrap(), "127.0.0.1:5001");
        ledger.register_peer("https://node.example:8443").unwrap();
        assert_eq!(ledger.peers().len(), 2);
        assert!(matches!(
            ledger.register_peer("http://"),
            Err(LedgerError::InvalidPeer(_))
        ));
        assert!(ledger.register_peer("  ").is_err());
    }

    #[test]
    fn clone_is_independent() {
        let ledger = Ledger::new(easy_config()).unwrap();
        let mut staged = ledger.clone();
        staged
            .submit_transaction(Transaction::issuance("a", 1))
            .unwrap();
        staged
            .submit_transaction(Transaction::issuance("b", 1))
            .unwrap();
        staged.mine_pending_transactions("miner").unwrap();
        assert_eq!(staged.len(), 2);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.pending().is_empty());
    }

    #[test]
    fn snapshot_reports_length() {
        let ledger = Ledger::new(easy_config()).unwrap();
        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.length, 1);
        assert_eq!(snapshot.chain, ledger.chain());
    }
}
