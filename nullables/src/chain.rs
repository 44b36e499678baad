//! Nullable chain: a scripted, in-memory chain client.
//!
//! Each call to `subscribe_blocks` consumes the next queued script. A script
//! either fails the subscribe call outright or plays a list of
//! [`ScriptStep`]s on a background task. When the steps run out the
//! producer drops its senders, which the consumer sees as a closed
//! subscription, unless the last step is [`ScriptStep::Hold`].

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use escrow_chain::{BlockSubscription, ChainClient, ChainError};
use escrow_types::{BlockHeight, DepositEvent, WalletAddress, WithdrawalConfirmedEvent};

/// One action of a scripted subscription.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Header(BlockHeight),
    Error(ChainError),
    Pause(Duration),
    /// Keep the subscription open until it is released.
    Hold,
}

#[derive(Debug)]
enum SubscriptionScript {
    Fail(ChainError),
    Play(Vec<ScriptStep>),
}

#[derive(Debug, Default)]
struct ChainState {
    tip: BlockHeight,
    deposits: Vec<DepositEvent>,
    withdrawals: Vec<WithdrawalConfirmedEvent>,
    scripts: VecDeque<SubscriptionScript>,
    failing_queries: usize,
    subscribe_calls: usize,
    queries: Vec<(BlockHeight, BlockHeight)>,
}

/// A deterministic [`ChainClient`] for tests.
///
/// Thread-safe for use with tokio's multi-threaded runtime.
#[derive(Debug, Default)]
pub struct NullChain {
    state: Mutex<ChainState>,
}

impl NullChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tip(tip: BlockHeight) -> Self {
        let chain = Self::default();
        chain.set_tip(tip);
        chain
    }

    pub fn set_tip(&self, tip: BlockHeight) {
        self.state.lock().unwrap().tip = tip;
    }

    pub fn add_deposit(&self, event: DepositEvent) {
        self.state.lock().unwrap().deposits.push(event);
    }

    pub fn add_withdrawal(&self, event: WithdrawalConfirmedEvent) {
        self.state.lock().unwrap().withdrawals.push(event);
    }

    /// Queue a subscription that plays `steps`.
    pub fn script_subscription(&self, steps: Vec<ScriptStep>) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .push_back(SubscriptionScript::Play(steps));
    }

    /// Queue a subscribe call that fails.
    pub fn script_subscribe_failure(&self, error: ChainError) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .push_back(SubscriptionScript::Fail(error));
    }

    /// Make the next `n` log queries fail.
    pub fn fail_next_queries(&self, n: usize) {
        self.state.lock().unwrap().failing_queries = n;
    }

    pub fn subscribe_calls(&self) -> usize {
        self.state.lock().unwrap().subscribe_calls
    }

    /// Ranges passed to `deposits`, in call order.
    pub fn queried_ranges(&self) -> Vec<(BlockHeight, BlockHeight)> {
        self.state.lock().unwrap().queries.clone()
    }

    fn begin_query(&self, from: BlockHeight, to: BlockHeight) -> Result<(), ChainError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_queries > 0 {
            state.failing_queries -= 1;
            return Err(ChainError::LogQuery {
                from,
                to,
                reason: "scripted failure".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for NullChain {
    async fn subscribe_blocks(&self, buffer: usize) -> Result<BlockSubscription, ChainError> {
        let script = {
            let mut state = self.state.lock().unwrap();
            state.subscribe_calls += 1;
            state.scripts.pop_front()
        };
        let steps = match script {
            Some(SubscriptionScript::Play(steps)) => steps,
            Some(SubscriptionScript::Fail(e)) => return Err(e),
            None => return Err(ChainError::Subscription("no scripted subscription".into())),
        };

        let (subscription, headers, errors, cancel) = BlockSubscription::channel(buffer);
        tokio::spawn(async move {
            for step in steps {
                let sent = match step {
                    ScriptStep::Header(h) => tokio::select! {
                        _ = cancel.cancelled() => return,
                        r = headers.send(h) => r.is_ok(),
                    },
                    ScriptStep::Error(e) => errors.send(e).await.is_ok(),
                    ScriptStep::Pause(d) => tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(d) => true,
                    },
                    ScriptStep::Hold => {
                        cancel.cancelled().await;
                        return;
                    }
                };
                if !sent {
                    return;
                }
            }
        });
        Ok(subscription)
    }

    async fn latest_block(&self) -> Result<BlockHeight, ChainError> {
        Ok(self.state.lock().unwrap().tip)
    }

    async fn deposits(
        &self,
        from: BlockHeight,
        to: BlockHeight,
        _escrow: &WalletAddress,
    ) -> Result<Vec<DepositEvent>, ChainError> {
        self.begin_query(from, to)?;
        let mut state = self.state.lock().unwrap();
        state.queries.push((from, to));
        let mut out: Vec<_> = state
            .deposits
            .iter()
            .filter(|e| (from..=to).contains(&e.height))
            .cloned()
            .collect();
        out.sort_by_key(|e| e.height);
        Ok(out)
    }

    async fn withdrawals(
        &self,
        from: BlockHeight,
        to: BlockHeight,
        _escrow: &WalletAddress,
    ) -> Result<Vec<WithdrawalConfirmedEvent>, ChainError> {
        self.begin_query(from, to)?;
        let state = self.state.lock().unwrap();
        let mut out: Vec<_> = state
            .withdrawals
            .iter()
            .filter(|e| (from..=to).contains(&e.height))
            .cloned()
            .collect();
        out.sort_by_key(|e| e.height);
        Ok(out)
    }
}
