//! Builds L1 transaction candidates from units of channel data.

use alloy_primitives::Bytes;
use eyre::Result;

use crate::{
    channels::{ChannelManager, TxData},
    telemetry::metrics,
    transactions::{intrinsic_gas, TxCandidate, TxManager, TxQueue, TxReceipt},
};

use super::batch_driver::{BatchDriver, PublishError};

impl<C, T> BatchDriver<C, T>
where
    C: ChannelManager,
    T: TxManager,
{
    /// Converts a unit of channel data into a transaction candidate and
    /// hands it to the queue, with the unit as the correlation token.
    ///
    /// In plasma mode a failed upload marks the unit failed so the
    /// channel manager requeues it; that is not an error for the round.
    pub(crate) async fn stage_transaction(
        &mut self,
        txdata: TxData,
        queue: &TxQueue<TxData, T>,
        receipts_tx: &tokio::sync::mpsc::Sender<TxReceipt<TxData>>,
    ) -> Result<(), PublishError> {
        let mut candidate = if self.cfg.use_blobs {
            match self.blob_tx_candidate(&txdata) {
                Ok(candidate) => candidate,
                Err(err) => {
                    // falling back to calldata here would spend far more
                    // gas than the chain is tuned for
                    return Err(PublishError::Other(
                        err.wrap_err("could not create blob tx candidate"),
                    ));
                }
            }
        } else {
            // the channel manager is contractually bound to emit
            // single-frame units on the calldata wire
            let frames = txdata.frames.len();
            if frames != 1 {
                panic!("unexpected number of frames in calldata transaction: {frames}");
            }
            let mut data = txdata.call_data();
            if self.cfg.use_plasma {
                match self.post_to_plasma(data.clone()).await {
                    Ok(commitment_data) => data = commitment_data,
                    Err(err) => {
                        tracing::error!("failed to post input to plasma DA: {:#}", err);
                        // requeue the unit so it can be retried
                        self.state.tx_failed(&txdata.id());
                        return Ok(());
                    }
                }
            }
            self.calldata_tx_candidate(data)
        };

        match intrinsic_gas(&candidate.data) {
            Ok(gas) => candidate.gas_limit = gas,
            // the transaction manager can estimate on its own
            Err(err) => tracing::error!("failed to calculate intrinsic gas: {:#}", err),
        }

        queue
            .send(txdata, candidate, receipts_tx)
            .await
            .map_err(|_| PublishError::Cancelled)
    }

    /// Uploads calldata to the DA store and returns the commitment
    /// payload that replaces it, bounded by the kill scope.
    async fn post_to_plasma(&self, data: Bytes) -> Result<Bytes> {
        let plasma = self
            .plasma
            .clone()
            .ok_or_else(|| eyre::eyre!("plasma mode enabled without a DA client"))?;
        let kill = self.kill.clone();
        let commitment = tokio::select! {
            _ = kill.cancelled() => eyre::bail!("cancelled while posting input"),
            result = plasma.set_input(data) => result?,
        };
        Ok(commitment.tx_data())
    }

    /// A blob transaction carrying one blob per frame and no calldata.
    fn blob_tx_candidate(&self, data: &TxData) -> Result<TxCandidate> {
        let blobs = data.blobs()?;
        // only the final frame can leave blob space unused
        let last_size = data.frames.last().map(|f| f.data.len()).unwrap_or(0);
        tracing::info!(
            size = data.len(),
            last_size = last_size,
            num_blobs = blobs.len(),
            "building blob transaction candidate",
        );
        metrics::BLOB_USED_BYTES.set(last_size as i64);
        Ok(TxCandidate {
            to: self.cfg.chain.batch_inbox,
            data: Bytes::new(),
            blobs,
            gas_limit: 0,
        })
    }

    /// A plain calldata transaction to the batch inbox.
    fn calldata_tx_candidate(&self, data: Bytes) -> TxCandidate {
        tracing::info!(size = data.len(), "building calldata transaction candidate");
        TxCandidate {
            to: self.cfg.chain.batch_inbox,
            data,
            blobs: Vec::new(),
            gas_limit: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{Frame, FrameId};
    use crate::config::Config;
    use crate::test_utils::{test_driver, wait_until};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn unit(frames: usize, frame_len: usize) -> TxData {
        TxData::new(
            (0..frames)
                .map(|number| Frame {
                    id: FrameId {
                        channel: [0xcc; 16],
                        number: number as u16,
                    },
                    data: vec![0xdd; frame_len].into(),
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_blob_candidate_has_gas_and_empty_calldata() {
        let (mut driver, mocks) = test_driver(Config {
            use_blobs: true,
            ..Config::default()
        });
        let queue = TxQueue::new(CancellationToken::new(), mocks.tx_mgr.clone(), 0);
        let (tx, _rx) = mpsc::channel(4);

        driver
            .stage_transaction(unit(2, 64), &queue, &tx)
            .await
            .unwrap();
        assert!(wait_until(|| mocks.tx_mgr.sent().len() == 1, Duration::from_secs(5)).await);

        let candidate = mocks.tx_mgr.sent().remove(0);
        assert_eq!(candidate.to, driver.cfg.chain.batch_inbox);
        assert!(candidate.data.is_empty());
        assert_eq!(candidate.blobs.len(), 2);
        // empty calldata costs exactly the base transaction gas
        assert_eq!(candidate.gas_limit, 21_000);
    }

    #[tokio::test]
    async fn test_calldata_candidate_carries_frame_bytes() {
        let (mut driver, mocks) = test_driver(Config::default());
        let queue = TxQueue::new(CancellationToken::new(), mocks.tx_mgr.clone(), 0);
        let (tx, _rx) = mpsc::channel(4);

        driver
            .stage_transaction(unit(1, 8), &queue, &tx)
            .await
            .unwrap();
        assert!(wait_until(|| mocks.tx_mgr.sent().len() == 1, Duration::from_secs(5)).await);

        let candidate = mocks.tx_mgr.sent().remove(0);
        assert_eq!(candidate.to, driver.cfg.chain.batch_inbox);
        assert_eq!(candidate.data.len(), 9);
        assert!(candidate.blobs.is_empty());
        assert!(candidate.gas_limit > 21_000);
    }

    #[tokio::test]
    async fn test_plasma_upload_replaces_calldata_with_commitment() {
        let (mut driver, mocks) = test_driver(Config {
            use_plasma: true,
            ..Config::default()
        });
        let queue = TxQueue::new(CancellationToken::new(), mocks.tx_mgr.clone(), 0);
        let (tx, _rx) = mpsc::channel(4);

        driver
            .stage_transaction(unit(1, 32), &queue, &tx)
            .await
            .unwrap();
        assert!(wait_until(|| mocks.tx_mgr.sent().len() == 1, Duration::from_secs(5)).await);

        // version byte + type byte + 32-byte hash
        let candidate = mocks.tx_mgr.sent().remove(0);
        assert_eq!(candidate.data.len(), 34);
        assert_eq!(mocks.plasma.inputs().len(), 1);
    }

    #[tokio::test]
    async fn test_plasma_failure_marks_unit_failed_without_send() {
        let (mut driver, mocks) = test_driver(Config {
            use_plasma: true,
            ..Config::default()
        });
        mocks.plasma.fail_uploads(true);
        let queue = TxQueue::new(CancellationToken::new(), mocks.tx_mgr.clone(), 0);
        let (tx, _rx) = mpsc::channel(4);

        let data = unit(1, 32);
        let id = data.id();
        driver.stage_transaction(data, &queue, &tx).await.unwrap();

        assert_eq!(mocks.manager.failed(), vec![id]);
        assert!(mocks.tx_mgr.sent().is_empty());
    }

    #[tokio::test]
    #[should_panic(expected = "unexpected number of frames")]
    async fn test_multi_frame_calldata_unit_is_fatal() {
        let (mut driver, mocks) = test_driver(Config::default());
        let queue = TxQueue::new(CancellationToken::new(), mocks.tx_mgr.clone(), 0);
        let (tx, _rx) = mpsc::channel(4);

        let _ = driver.stage_transaction(unit(2, 8), &queue, &tx).await;
    }
}
