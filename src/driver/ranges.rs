//! Resolves which L2 blocks to ingest and loads them into the channel
//! manager.

use eyre::{Result, WrapErr};

use crate::{
    channels::{BlockUpdate, ChannelManager},
    common::{BlockId, BlockInfo, L2Block},
    telemetry::metrics,
    transactions::TxManager,
};

use super::batch_driver::BatchDriver;

/// Why an ingestion round stopped early. The underlying error is logged
/// where it happens; the next tick retries.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum IngestError {
    /// The channel manager rejected a block that does not extend its chain
    Reorg,
    /// A sequencer or L2 RPC failed
    Rpc,
}

impl<C, T> BatchDriver<C, T>
where
    C: ChannelManager,
    T: TxManager,
{
    /// Computes the exclusive range of L2 blocks to ingest this tick.
    ///
    /// Binds the bookmark to the safe head when uninitialized, and snaps
    /// it forward when the on-chain safe head has overtaken it.
    pub(crate) async fn calculate_l2_block_range(&mut self) -> Result<(BlockId, BlockId)> {
        let rollup = self.endpoints.rollup_node().await?;
        let shutdown = self.shutdown.clone();
        let status = self
            .bounded(&shutdown, async move { rollup.sync_status().await })
            .await
            .wrap_err("getting sync status")?;
        if status.head_l1 == BlockInfo::default() {
            eyre::bail!("empty sync status");
        }

        let start = match self.last_stored_block {
            None => {
                tracing::info!(safe = %status.safe_l2.id(), "starting batch submission work at safe head");
                status.safe_l2.id()
            }
            Some(last) if last.number < status.safe_l2.number => {
                tracing::warn!(
                    last = %last,
                    safe = %status.safe_l2.id(),
                    "last submitted block lagged behind L2 safe head, continuing from the safe head",
                );
                status.safe_l2.id()
            }
            Some(last) => last,
        };
        self.last_stored_block = Some(start);

        // kept as a defensive invariant; a healthy sequencer never reports it
        if status.safe_l2.number >= status.unsafe_l2.number {
            eyre::bail!("L2 safe head ahead of L2 unsafe head");
        }

        Ok((start, status.unsafe_l2.id()))
    }

    /// Ingests all blocks in this tick's range, advancing the bookmark
    /// per block. A reorg resets the bookmark and aborts the round.
    pub(crate) async fn load_blocks_into_state(&mut self) -> Result<(), IngestError> {
        let (start, end) = match self.calculate_l2_block_range().await {
            Ok(range) => range,
            Err(err) => {
                tracing::warn!("error calculating L2 block range: {:#}", err);
                return Err(IngestError::Rpc);
            }
        };

        let mut latest = None;
        for number in start.number + 1..=end.number {
            let block = match self.load_block(number).await {
                Ok(block) => block,
                Err(err) => {
                    tracing::warn!("failed to load block into state: {:#}", err);
                    return Err(IngestError::Rpc);
                }
            };
            let id = block.id();
            match self.state.add_l2_block(block) {
                BlockUpdate::Added => {
                    self.last_stored_block = Some(id);
                    latest = Some(id);
                }
                BlockUpdate::Reorg => {
                    tracing::warn!(block_number = number, "found L2 reorg");
                    self.last_stored_block = None;
                    return Err(IngestError::Reorg);
                }
            }
        }

        if let Some(id) = latest {
            metrics::L2_BLOCKS_LOADED.set(id.number as i64);
            tracing::debug!(last = %id, "loaded L2 blocks into the channel manager");
        }
        Ok(())
    }

    /// Fetches one L2 block, bounded by the network timeout and the
    /// shutdown scope.
    async fn load_block(&self, number: u64) -> Result<L2Block> {
        let l2 = self.endpoints.l2_client().await?;
        let shutdown = self.shutdown.clone();
        self.bounded(&shutdown, async move { l2.block_by_number(number).await })
            .await
            .wrap_err_with(|| format!("getting L2 block {number}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::test_utils::{block_info, l2_block, sync_status, test_driver};

    #[tokio::test]
    async fn test_range_binds_bookmark_to_safe_head() {
        let (mut driver, mocks) = test_driver(Config::default());
        mocks.rollup.set_status(sync_status(100, 103, 1));

        let (start, end) = driver.calculate_l2_block_range().await.unwrap();
        assert_eq!(start, block_info(100, 1).id());
        assert_eq!(end, block_info(103, 1).id());
        assert_eq!(driver.last_stored_block, Some(start));
    }

    #[tokio::test]
    async fn test_range_snaps_forward_to_lagged_safe_head() {
        let (mut driver, mocks) = test_driver(Config::default());
        driver.last_stored_block = Some(block_info(90, 1).id());
        mocks.rollup.set_status(sync_status(100, 103, 1));

        let (start, _) = driver.calculate_l2_block_range().await.unwrap();
        assert_eq!(start, block_info(100, 1).id());
    }

    #[tokio::test]
    async fn test_range_keeps_bookmark_past_safe_head() {
        let (mut driver, mocks) = test_driver(Config::default());
        driver.last_stored_block = Some(block_info(101, 1).id());
        mocks.rollup.set_status(sync_status(100, 103, 1));

        let (start, _) = driver.calculate_l2_block_range().await.unwrap();
        assert_eq!(start, block_info(101, 1).id());
    }

    #[tokio::test]
    async fn test_range_rejects_empty_sync_status() {
        let (mut driver, mocks) = test_driver(Config::default());
        let mut status = sync_status(100, 103, 1);
        status.head_l1 = Default::default();
        mocks.rollup.set_status(status);

        let err = driver.calculate_l2_block_range().await.unwrap_err();
        assert!(err.to_string().contains("empty sync status"));
    }

    #[tokio::test]
    async fn test_range_rejects_safe_ahead_of_unsafe() {
        let (mut driver, mocks) = test_driver(Config::default());
        mocks.rollup.set_status(sync_status(100, 100, 1));

        let err = driver.calculate_l2_block_range().await.unwrap_err();
        assert!(err.to_string().contains("safe head ahead"));
        // the bookmark still binds before the guard trips
        assert_eq!(driver.last_stored_block, Some(block_info(100, 1).id()));
    }

    #[tokio::test]
    async fn test_load_blocks_is_contiguous_and_monotonic() {
        let (mut driver, mocks) = test_driver(Config::default());
        mocks.rollup.set_status(sync_status(100, 103, 1));
        for number in 101..=103 {
            mocks.l2.push_block(l2_block(number, 1));
        }

        driver.load_blocks_into_state().await.unwrap();

        let added = mocks.manager.added();
        assert_eq!(
            added,
            vec![
                l2_block(101, 1).id(),
                l2_block(102, 1).id(),
                l2_block(103, 1).id()
            ]
        );
        assert_eq!(driver.last_stored_block, Some(l2_block(103, 1).id()));
    }

    #[tokio::test]
    async fn test_load_blocks_aborts_on_missing_block() {
        let (mut driver, mocks) = test_driver(Config::default());
        mocks.rollup.set_status(sync_status(100, 103, 1));
        mocks.l2.push_block(l2_block(101, 1));
        // block 102 is missing; the round aborts after 101

        assert!(matches!(
            driver.load_blocks_into_state().await,
            Err(IngestError::Rpc)
        ));
        assert_eq!(driver.last_stored_block, Some(l2_block(101, 1).id()));
    }

    #[tokio::test]
    async fn test_reorg_resets_bookmark() {
        let (mut driver, mocks) = test_driver(Config::default());
        mocks.rollup.set_status(sync_status(100, 103, 1));
        for number in 101..=103 {
            mocks.l2.push_block(l2_block(number, 1));
        }
        mocks.manager.reorg_at(102);

        assert!(matches!(
            driver.load_blocks_into_state().await,
            Err(IngestError::Reorg)
        ));
        assert_eq!(driver.last_stored_block, None);
        assert_eq!(mocks.manager.added(), vec![l2_block(101, 1).id()]);
    }
}
