//! Serves compact blocks, block transactions and pooled transactions to
//! peers that are catching up on recent gossip.
//!
//! Only blocks close to the head are served: older data is expected to be
//! fetched through regular sync. Every decline is a `CannotSatisfyRequest`
//! echoing the request's rpc id.

use std::sync::Arc;

use relay_chain::{Chain, MemPool};
use relay_messages::{
    CannotSatisfyRequest, CompactBlock, GetBlockTransactionsRequest, GetBlockTransactionsResponse,
    GetCompactBlockRequest, GetCompactBlockResponse, PooledTransactionsRequest, PooledTransactionsResponse,
    RpcId, WireMessage,
};
use relay_types::{Block, BlockHash};

pub struct CompactDataServer {
    chain: Arc<dyn Chain>,
    mempool: Arc<dyn MemPool>,
    compact_block_max_depth: u64,
    block_transactions_max_depth: u64,
}

impl CompactDataServer {
    pub fn new(
        chain: Arc<dyn Chain>,
        mempool: Arc<dyn MemPool>,
        compact_block_max_depth: u64,
        block_transactions_max_depth: u64,
    ) -> Self {
        Self {
            chain,
            mempool,
            compact_block_max_depth,
            block_transactions_max_depth,
        }
    }

    pub fn handle_compact_block_request(&self, request: &GetCompactBlockRequest) -> WireMessage {
        let Some(block) = self.recent_block(&request.block_hash, self.compact_block_max_depth) else {
            return cannot_satisfy(request.rpc_id);
        };
        WireMessage::GetCompactBlockResponse(GetCompactBlockResponse {
            compact_block: CompactBlock::from_block(&block),
            rpc_id: request.rpc_id,
        })
    }

    /// Any index outside the block declines the whole request.
    pub fn handle_block_transactions_request(&self, request: &GetBlockTransactionsRequest) -> WireMessage {
        let Some(block) = self.recent_block(&request.block_hash, self.block_transactions_max_depth) else {
            return cannot_satisfy(request.rpc_id);
        };

        let mut transactions = Vec::with_capacity(request.transaction_indexes.len());
        for &index in &request.transaction_indexes {
            let Some(transaction) = usize::try_from(index).ok().and_then(|i| block.transactions.get(i)) else {
                tracing::debug!(
                    hash = %request.block_hash,
                    index,
                    count = block.transactions.len(),
                    "transaction index out of range"
                );
                return cannot_satisfy(request.rpc_id);
            };
            transactions.push(transaction.clone());
        }

        WireMessage::GetBlockTransactionsResponse(GetBlockTransactionsResponse {
            block_hash: request.block_hash,
            transactions,
            rpc_id: request.rpc_id,
        })
    }

    /// Answers with whatever is in the mempool; unknown hashes are left out.
    pub fn handle_pooled_transactions_request(&self, request: &PooledTransactionsRequest) -> WireMessage {
        let transactions = request.hashes.iter().filter_map(|h| self.mempool.get(h)).collect();
        WireMessage::PooledTransactionsResponse(PooledTransactionsResponse {
            transactions,
            rpc_id: request.rpc_id,
        })
    }

    /// A stored block no more than `max_depth` below the head.
    fn recent_block(&self, hash: &BlockHash, max_depth: u64) -> Option<Block> {
        let block = self.chain.get_block(hash)?;
        let head = self.chain.head();
        let depth = head.sequence.saturating_sub(block.sequence());
        (depth <= max_depth).then_some(block)
    }
}

fn cannot_satisfy(rpc_id: RpcId) -> WireMessage {
    WireMessage::CannotSatisfyRequest(CannotSatisfyRequest { rpc_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_nullables::{NullChain, NullMemPool};
    use relay_types::Transaction;

    fn server(chain: &Arc<NullChain>, mempool: &Arc<NullMemPool>) -> CompactDataServer {
        CompactDataServer::new(chain.clone(), mempool.clone(), 5, 10)
    }

    fn chain_of(length: usize) -> Arc<NullChain> {
        let chain = Arc::new(NullChain::new());
        for _ in 0..length {
            chain.append(chain.make_block(vec![]));
        }
        chain
    }

    #[test]
    fn compact_block_for_unknown_hash_is_declined() {
        let chain = chain_of(0);
        let mempool = Arc::new(NullMemPool::new());
        let response = server(&chain, &mempool).handle_compact_block_request(&GetCompactBlockRequest {
            block_hash: BlockHash::new([0xAB; 32]),
            rpc_id: 11,
        });
        assert_eq!(response, cannot_satisfy(11));
    }

    #[test]
    fn compact_block_depth_window() {
        let chain = chain_of(6);
        let mempool = Arc::new(NullMemPool::new());
        let server = server(&chain, &mempool);

        let genesis = chain.genesis().hash();
        let response = server.handle_compact_block_request(&GetCompactBlockRequest {
            block_hash: genesis,
            rpc_id: 1,
        });
        assert_eq!(response, cannot_satisfy(1));

        // Depth exactly 5 is still served.
        let block = chain.block_at(2).unwrap();
        let response = server.handle_compact_block_request(&GetCompactBlockRequest {
            block_hash: block.hash(),
            rpc_id: 2,
        });
        match response {
            WireMessage::GetCompactBlockResponse(r) => {
                assert_eq!(r.rpc_id, 2);
                assert_eq!(r.compact_block.header, block.header);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn block_transactions_in_request_order() {
        let chain = chain_of(0);
        let txs = vec![NullChain::transaction(1), NullChain::transaction(2)];
        let block = chain.make_block(txs);
        chain.append(block.clone());
        let mempool = Arc::new(NullMemPool::new());

        let response = server(&chain, &mempool).handle_block_transactions_request(&GetBlockTransactionsRequest {
            block_hash: block.hash(),
            transaction_indexes: vec![2, 0],
            rpc_id: 4,
        });
        match response {
            WireMessage::GetBlockTransactionsResponse(r) => {
                assert_eq!(r.rpc_id, 4);
                assert_eq!(r.block_hash, block.hash());
                assert_eq!(
                    r.transactions,
                    vec![block.transactions[2].clone(), block.transactions[0].clone()]
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn any_bad_index_declines_whole_request() {
        let chain = chain_of(0);
        let block = chain.make_block(vec![NullChain::transaction(1)]);
        chain.append(block.clone());
        let mempool = Arc::new(NullMemPool::new());
        let server = server(&chain, &mempool);

        for indexes in [vec![0, 2], vec![-1], vec![1, i32::MAX]] {
            let response = server.handle_block_transactions_request(&GetBlockTransactionsRequest {
                block_hash: block.hash(),
                transaction_indexes: indexes,
                rpc_id: 9,
            });
            assert_eq!(response, cannot_satisfy(9));
        }
    }

    #[test]
    fn block_transactions_depth_limit() {
        let chain = chain_of(11);
        let mempool = Arc::new(NullMemPool::new());
        let server = server(&chain, &mempool);

        let too_deep = chain.block_at(1).unwrap();
        let response = server.handle_block_transactions_request(&GetBlockTransactionsRequest {
            block_hash: too_deep.hash(),
            transaction_indexes: vec![0],
            rpc_id: 3,
        });
        assert_eq!(response, cannot_satisfy(3));

        let in_window = chain.block_at(2).unwrap();
        let response = server.handle_block_transactions_request(&GetBlockTransactionsRequest {
            block_hash: in_window.hash(),
            transaction_indexes: vec![0],
            rpc_id: 3,
        });
        assert!(matches!(response, WireMessage::GetBlockTransactionsResponse(_)));
    }

    #[test]
    fn pooled_transactions_omit_missing() {
        let chain = chain_of(0);
        let mempool = Arc::new(NullMemPool::new());
        let known: Transaction = NullChain::transaction(5);
        mempool.insert(known.clone());

        let response = server(&chain, &mempool).handle_pooled_transactions_request(&PooledTransactionsRequest {
            hashes: vec![NullChain::transaction(6).hash(), known.hash()],
            rpc_id: 8,
        });
        assert_eq!(
            response,
            WireMessage::PooledTransactionsResponse(PooledTransactionsResponse {
                transactions: vec![known],
                rpc_id: 8,
            })
        );
    }
}
