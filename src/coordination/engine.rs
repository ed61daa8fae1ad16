//! Swap orchestrator: drives the local party through each swap

use super::notification::SwapNotification;
use super::queue::{EnqueueOutcome, SwapEventQueue};
use super::timeout::validate_counterparty_timeout;
use crate::chain::ChainManager;
use crate::config::RelayerConfig;
use crate::error::{PortalError, PortalResult};
use crate::events::{ChainEvent, NativeEvent, PortalEvent, PORTAL_CHAIN};
use crate::state::{SwapStatus, SwapStore};
use crate::swap::{
    verify_secret, Invoice, Liquidity, Party, Role, Swap, SwapDiff, SwapId, SwapOrder, SwapState,
};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::time::{interval, timeout, Duration};
use tracing::{debug, error, info, warn};

const NOTIFICATION_CAPACITY: usize = 1024;

/// Reacts to chain events on behalf of one portal address
pub struct Orchestrator {
    /// Chain clients and the shared event bus
    chains: Arc<ChainManager>,
    /// Swap persistence
    store: Arc<dyn SwapStore>,
    /// Configuration
    config: RelayerConfig,
    /// Early transitions waiting for their predecessors
    queue: SwapEventQueue,
    /// One writer per swap
    swap_locks: DashMap<SwapId, Arc<Mutex<()>>>,
    /// Last state the local party acted on, per swap
    dispatched: DashMap<SwapId, SwapState>,
    /// Swaps known not to involve the local party, with when they were seen
    foreign: DashMap<SwapId, DateTime<Utc>>,
    notify_tx: broadcast::Sender<SwapNotification>,
    shutdown: watch::Sender<bool>,
}

impl Orchestrator {
    pub fn new(chains: Arc<ChainManager>, store: Arc<dyn SwapStore>, config: RelayerConfig) -> Self {
        let (notify_tx, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let (shutdown, _) = watch::channel(false);
        let queue = SwapEventQueue::new(chrono::Duration::seconds(config.queue_ttl_secs as i64));

        Self {
            chains,
            store,
            config,
            queue,
            swap_locks: DashMap::new(),
            dispatched: DashMap::new(),
            foreign: DashMap::new(),
            notify_tx,
            shutdown,
        }
    }

    /// Portal address the orchestrator acts for
    pub fn address(&self) -> &str {
        &self.config.portal_address
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SwapNotification> {
        self.notify_tx.subscribe()
    }

    /// Transitions waiting in the reordering queue
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// Main loop: every event is handled on its own task
    pub async fn run(self: Arc<Self>) -> PortalResult<()> {
        let mut events = self.chains.subscribe_events();
        let mut shutdown = self.shutdown.subscribe();
        let mut cleanup_interval = interval(Duration::from_secs(self.config.cleanup_interval_secs));

        info!(address = %self.config.portal_address, "Orchestrator started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => break,

                received = events.recv() => match received {
                    Ok(event) => {
                        let this = self.clone();
                        tokio::spawn(async move { this.handle_event(event).await });
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Orchestrator lagged behind the event bus, {} events skipped", skipped);
                        let this = self.clone();
                        tokio::spawn(async move { this.reconcile().await });
                    }
                    Err(RecvError::Closed) => break,
                },

                _ = cleanup_interval.tick() => self.cleanup().await,
            }
        }

        info!("Orchestrator stopped");
        Ok(())
    }

    /// Handle one chain event; errors are logged and published, never returned
    pub async fn handle_event(&self, event: ChainEvent) {
        crate::metrics::record_event(&event);
        debug!(chain = event.chain(), event = event.name(), "Handling event");

        let swap_id = event.swap_id();
        if let Err(e) = self.route_event(event).await {
            self.report(swap_id, e).await;
        }
    }

    async fn route_event(&self, event: ChainEvent) -> PortalResult<()> {
        match event {
            ChainEvent::Portal(event) => match event {
                PortalEvent::SwapMatched { swap } => self.on_snapshot(swap).await,
                PortalEvent::SwapHolderInvoiced { swap_id, invoice } => {
                    self.on_diff(swap_id, SwapDiff::HolderInvoiced { invoice }).await
                }
                PortalEvent::SwapSeekerInvoiced { swap_id, invoice } => {
                    self.on_diff(swap_id, SwapDiff::SeekerInvoiced { invoice }).await
                }
                PortalEvent::AssetMinted { liquidity } => {
                    if self.owns(&liquidity) {
                        info!(chain = %liquidity.chain, symbol = %liquidity.symbol, amount = %liquidity.amount, "Deposit minted");
                        self.notify(SwapNotification::Deposited { liquidity });
                    }
                    Ok(())
                }
                PortalEvent::AssetBurned { liquidity } => {
                    debug!(chain = %liquidity.chain, symbol = %liquidity.symbol, "Asset burned");
                    Ok(())
                }
                PortalEvent::BlockHeight { height } => self.record_height(PORTAL_CHAIN, height).await,
            },

            ChainEvent::Native { chain, event } => match event {
                NativeEvent::Deposit { liquidity } => {
                    debug!(chain = %chain, owner = %liquidity.owner, "Deposit observed");
                    Ok(())
                }
                NativeEvent::Withdraw { liquidity } => {
                    if self.owns(&liquidity) {
                        info!(chain = %chain, symbol = %liquidity.symbol, amount = %liquidity.amount, "Withdrawal received");
                        self.notify(SwapNotification::Withdrawn { liquidity });
                    }
                    Ok(())
                }
                NativeEvent::SwapHolderPaid { swap_id, receipt } => {
                    self.on_diff(swap_id, SwapDiff::HolderPaid { receipt }).await
                }
                NativeEvent::SwapSeekerPaid { swap_id, receipt } => {
                    self.on_diff(swap_id, SwapDiff::SeekerPaid { receipt }).await
                }
                NativeEvent::SwapHolderSettled {
                    swap_id,
                    secret,
                    receipt,
                } => {
                    self.on_diff(swap_id, SwapDiff::HolderSettled { secret, receipt })
                        .await
                }
                NativeEvent::SwapSeekerSettled { swap_id, receipt } => {
                    self.on_diff(swap_id, SwapDiff::SeekerSettled { receipt }).await
                }
                NativeEvent::BlockHeight { height } => self.record_height(&chain, height).await,
            },
        }
    }

    /// A full swap snapshot from the portal chain
    async fn on_snapshot(&self, remote: Swap) -> PortalResult<()> {
        let Some(role) = remote.role_of(&self.config.portal_address) else {
            debug!(swap_id = %remote.id_hex(), "Ignoring swap without the local party");
            self.foreign.insert(remote.id, Utc::now());
            return Ok(());
        };

        let lock = self.swap_lock(&remote.id);
        let _guard = lock.lock().await;

        let (mut swap, from) = match self.store.get(&remote.id).await? {
            Some(mut local) => {
                let from = local.state;
                local.update_from_swap(&remote)?;
                (local, from)
            }
            None => {
                self.adopt(&remote, role).await?;
                let from = remote.state;
                (remote, from)
            }
        };

        let drained = self.apply_queued(&mut swap);
        self.store.update(&swap).await?;
        self.transitioned(&swap, from);
        drained?;

        self.advance(&swap, role).await
    }

    /// A single transition observed on some chain
    async fn on_diff(&self, swap_id: SwapId, diff: SwapDiff) -> PortalResult<()> {
        if self.foreign.contains_key(&swap_id) {
            return Ok(());
        }

        let lock = self.swap_lock(&swap_id);
        let _guard = lock.lock().await;

        let mut swap = match self.store.get(&swap_id).await? {
            Some(swap) => swap,
            None => match self.fetch_unknown(&swap_id).await? {
                Some(swap) => swap,
                None => return Ok(()),
            },
        };
        let Some(role) = swap.role_of(&self.config.portal_address) else {
            return Ok(());
        };

        match self.queue.enqueue(&swap, &diff) {
            EnqueueOutcome::Process => {}
            EnqueueOutcome::Queued => {
                crate::metrics::record_queue_depth(self.queue.len());
                return self.advance(&swap, role).await;
            }
            EnqueueOutcome::Stale => return self.advance(&swap, role).await,
        }

        let from = swap.state;
        swap.update(&diff)?;
        let drained = self.apply_queued(&mut swap);
        self.store.update(&swap).await?;
        self.transitioned(&swap, from);
        drained?;

        self.advance(&swap, role).await
    }

    /// Look up a swap seen for the first time through a diff
    async fn fetch_unknown(&self, swap_id: &SwapId) -> PortalResult<Option<Swap>> {
        let remote = self.chains.portal().get_swap(swap_id).await?;
        if remote.id != *swap_id {
            return Err(PortalError::invalid_swap(
                hex::encode(swap_id),
                format!("portal returned swap {}", remote.id_hex()),
            ));
        }

        match remote.role_of(&self.config.portal_address) {
            Some(role) => {
                self.adopt(&remote, role).await?;
                Ok(Some(remote))
            }
            None => {
                self.foreign.insert(remote.id, Utc::now());
                Ok(None)
            }
        }
    }

    async fn adopt(&self, swap: &Swap, role: Role) -> PortalResult<()> {
        swap.check_secret()?;
        info!(
            swap_id = %swap.id_hex(),
            role = %role,
            state = %swap.state,
            holder_chain = %swap.secret_holder.chain,
            seeker_chain = %swap.secret_seeker.chain,
            "Swap matched"
        );
        crate::metrics::record_swap_matched(&role.to_string());
        self.store.put(swap).await
    }

    /// Apply buffered transitions that now follow on from the swap's state
    fn apply_queued(&self, swap: &mut Swap) -> PortalResult<()> {
        let ready = self.queue.process_queue(swap);
        if ready.is_empty() {
            return Ok(());
        }

        crate::metrics::record_queue_depth(self.queue.len());
        for diff in &ready {
            swap.update(diff)?;
        }
        Ok(())
    }

    fn transitioned(&self, swap: &Swap, from: SwapState) {
        if swap.state == from {
            return;
        }
        info!(swap_id = %swap.id_hex(), from = %from, to = %swap.state, "Swap advanced");
        for state in SwapState::ALL {
            if state > from && state <= swap.state {
                crate::metrics::record_transition(state);
            }
        }
        self.notify(SwapNotification::Transitioned {
            swap_id: swap.id,
            from,
            to: swap.state,
        });
    }

    /// Act for the state the swap rests on, once per state
    async fn advance(&self, swap: &Swap, role: Role) -> PortalResult<()> {
        if !self.claim(swap) {
            return Ok(());
        }

        if swap.state.is_terminal() {
            return self.complete(swap).await;
        }

        if let Some(SwapStatus::Failed { reason }) = self.store.status(&swap.id).await? {
            debug!(swap_id = %swap.id_hex(), reason = %reason, "Not acting on failed swap");
            return Ok(());
        }

        let result = self.act(swap, role).await;
        if let Err(e) = &result {
            // Transient failures may be retried by a later event for the same state
            if !e.halts_swap() {
                self.dispatched.remove_if(&swap.id, |_, state| *state == swap.state);
            }
        }
        result
    }

    fn claim(&self, swap: &Swap) -> bool {
        match self.dispatched.entry(swap.id) {
            Entry::Occupied(mut entry) => {
                if *entry.get() < swap.state {
                    entry.insert(swap.state);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(swap.state);
                true
            }
        }
    }

    async fn act(&self, swap: &Swap, role: Role) -> PortalResult<()> {
        match (swap.state, role) {
            (SwapState::Matched, Role::Seeker) => {
                self.create_invoice(swap, SwapState::Matched, Role::Seeker).await
            }
            (SwapState::HolderInvoiced, Role::Holder) => {
                self.create_invoice(swap, SwapState::HolderInvoiced, Role::Holder)
                    .await
            }
            (SwapState::SeekerInvoiced, Role::Seeker) => {
                self.pay_invoice(swap, SwapState::SeekerInvoiced, Role::Seeker)
                    .await
            }
            (SwapState::HolderPaid, Role::Holder) => {
                self.pay_invoice(swap, SwapState::HolderPaid, Role::Holder).await
            }
            (SwapState::SeekerPaid, Role::Seeker) => self.settle_with_local_secret(swap).await,
            (SwapState::HolderSettled, Role::Holder) => self.settle_with_revealed_secret(swap).await,
            (state, role) => {
                debug!(swap_id = %swap.id_hex(), state = %state, role = %role, "Waiting for counterparty");
                Ok(())
            }
        }
    }

    fn expect_turn(&self, swap: &Swap, state: SwapState, role: Role) -> PortalResult<()> {
        if swap.state != state {
            return Err(PortalError::invalid_swap(
                swap.id_hex(),
                format!("expected state {}, found {}", state, swap.state),
            ));
        }
        if swap.role_of(&self.config.portal_address) != Some(role) {
            return Err(PortalError::invalid_swap(
                swap.id_hex(),
                format!("local party is not the {}", role),
            ));
        }
        Ok(())
    }

    /// Create the local party's invoice on its own chain and register it
    async fn create_invoice(&self, swap: &Swap, state: SwapState, role: Role) -> PortalResult<()> {
        self.expect_turn(swap, state, role)?;

        let party = swap.party(role);
        let chain = self.chains.get(&party.chain)?;
        let invoice = chain.create_invoice(&swap.leg(role)).await?;
        info!(
            swap_id = %swap.id_hex(),
            chain = %party.chain,
            invoice = %invoice.id,
            "Created invoice"
        );

        self.chains
            .portal()
            .register_invoice(&swap.id, &swap.secret_hash, party.amount, &invoice)
            .await?;
        info!(swap_id = %swap.id_hex(), invoice = %invoice.id, "Registered invoice");
        Ok(())
    }

    /// Pay the counterparty's invoice on the counterparty's chain
    async fn pay_invoice(&self, swap: &Swap, state: SwapState, role: Role) -> PortalResult<()> {
        self.expect_turn(swap, state, role)?;

        let counterparty = role.counterparty();
        let my_invoice = required_invoice(swap, role)?;
        let their_invoice = required_invoice(swap, counterparty)?;
        self.check_timeouts(swap, role, my_invoice, their_invoice)
            .await?;

        let theirs = swap.party(counterparty);
        let chain = self.chains.get(&theirs.chain)?;
        chain.pay_invoice(&swap.leg(counterparty)).await?;
        info!(
            swap_id = %swap.id_hex(),
            chain = %theirs.chain,
            invoice = %their_invoice.id,
            "Paid counterparty invoice"
        );
        Ok(())
    }

    /// Refuse to pay unless the counterparty's lock leaves a safe margin
    async fn check_timeouts(
        &self,
        swap: &Swap,
        role: Role,
        my_invoice: &Invoice,
        their_invoice: &Invoice,
    ) -> PortalResult<()> {
        let mine = swap.party(role);
        let theirs = swap.party(role.counterparty());
        let my_chain = self.chains.get(&mine.chain)?;
        let their_chain = self.chains.get(&theirs.chain)?;

        let (my_timeout, their_timeout, my_height, their_height) = tokio::try_join!(
            my_chain.fetch_invoice_timeout(&my_invoice.id),
            their_chain.fetch_invoice_timeout(&their_invoice.id),
            my_chain.get_block_height(),
            their_chain.get_block_height(),
        )?;

        let validation = validate_counterparty_timeout(
            my_timeout,
            their_timeout,
            my_height,
            their_height,
            role == Role::Holder,
            &self.chains.params(&mine.chain)?,
            &self.chains.params(&theirs.chain)?,
        );

        if !validation.is_valid {
            return Err(PortalError::UnsafeTimeout {
                swap_id: swap.id_hex(),
                reason: validation.reason.unwrap_or_default(),
                required_secs: validation.required_buffer_secs,
                actual_secs: validation.actual_buffer_secs,
            });
        }

        debug!(
            swap_id = %swap.id_hex(),
            my_remaining_secs = validation.my_remaining_secs,
            their_remaining_secs = validation.their_remaining_secs,
            buffer_secs = validation.actual_buffer_secs,
            "Counterparty timeout accepted"
        );
        Ok(())
    }

    /// Settle the seeker's own invoice with the locally generated secret
    async fn settle_with_local_secret(&self, swap: &Swap) -> PortalResult<()> {
        self.expect_turn(swap, SwapState::SeekerPaid, Role::Seeker)?;

        let secret = self
            .store
            .get_secret(&swap.secret_hash)
            .await?
            .ok_or_else(|| {
                PortalError::invalid_swap(swap.id_hex(), "no local secret for the swap's hash")
            })?;
        if !verify_secret(&secret, &swap.secret_hash) {
            return Err(PortalError::SecretMismatch {
                secret_hash: hex::encode(swap.secret_hash),
            });
        }

        self.settle(swap, Role::Seeker, &secret).await
    }

    /// Settle the holder's own invoice with the secret revealed on chain
    async fn settle_with_revealed_secret(&self, swap: &Swap) -> PortalResult<()> {
        self.expect_turn(swap, SwapState::HolderSettled, Role::Holder)?;

        let secret = swap.secret().ok_or_else(|| {
            PortalError::invalid_swap(swap.id_hex(), "secret was not revealed")
        })?;
        self.settle(swap, Role::Holder, secret).await
    }

    async fn settle(&self, swap: &Swap, role: Role, secret: &[u8]) -> PortalResult<()> {
        required_invoice(swap, role)?;
        let party = swap.party(role);
        let chain = self.chains.get(&party.chain)?;
        let settled = chain.settle_invoice(&swap.leg(role), secret).await?;
        info!(
            swap_id = %swap.id_hex(),
            chain = %party.chain,
            receipt = ?settled.receipt.map(|r| r.id),
            "Settled invoice"
        );
        Ok(())
    }

    async fn complete(&self, swap: &Swap) -> PortalResult<()> {
        if let Some(status) = self.store.status(&swap.id).await? {
            if status.is_finished() {
                return Ok(());
            }
        }
        self.store.mark_completed(&swap.id).await?;
        if self.store.status(&swap.id).await? == Some(SwapStatus::Completed) {
            info!(swap_id = %swap.id_hex(), "Swap completed");
            crate::metrics::record_swap_completed();
            self.notify(SwapNotification::Completed { swap: swap.clone() });
        }
        Ok(())
    }

    /// Log an error; mark the swap failed if the error halts it
    async fn report(&self, swap_id: Option<SwapId>, err: PortalError) {
        let id = swap_id.map(hex::encode).unwrap_or_default();
        error!(
            swap_id = %id,
            kind = err.kind(),
            chain = err.chain().unwrap_or(""),
            "Error handling event: {}",
            err
        );

        if let Some(swap_id) = swap_id {
            if err.halts_swap() {
                self.fail(&swap_id, &err).await;
            }
        }

        self.notify(SwapNotification::Error {
            swap_id,
            error: err,
        });
    }

    async fn fail(&self, swap_id: &SwapId, err: &PortalError) {
        if let Err(e) = self.store.mark_failed(swap_id, &err.to_string()).await {
            warn!(swap_id = %hex::encode(swap_id), "Could not mark swap failed: {}", e);
            return;
        }
        crate::metrics::record_swap_failed(err.kind());
        self.notify(SwapNotification::Failed {
            swap_id: *swap_id,
            error: err.clone(),
        });
    }

    async fn record_height(&self, chain: &str, height: u64) -> PortalResult<()> {
        self.store.set_block_height(chain, height).await?;
        crate::metrics::record_block_height(chain, height);
        Ok(())
    }

    fn owns(&self, liquidity: &Liquidity) -> bool {
        liquidity.owner.eq_ignore_ascii_case(&self.config.portal_address)
    }

    fn notify(&self, notification: SwapNotification) {
        // Nobody listening is fine
        let _ = self.notify_tx.send(notification);
    }

    fn swap_lock(&self, swap_id: &SwapId) -> Arc<Mutex<()>> {
        self.swap_locks.entry(*swap_id).or_default().clone()
    }

    fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.config.operation_timeout_secs)
    }

    /// Periodic cleanup
    async fn cleanup(&self) {
        self.cleanup_at(Utc::now()).await
    }

    async fn cleanup_at(&self, now: DateTime<Utc>) {
        let purged = self.queue.purge_expired_at(now);
        if purged > 0 {
            warn!("Purged {} expired queued transitions", purged);
        }
        crate::metrics::record_queue_depth(self.queue.len());
        // Locks nobody holds or waits on
        self.swap_locks.retain(|_, lock| Arc::strong_count(lock) > 1);

        let ttl = chrono::Duration::seconds(self.config.queue_ttl_secs as i64);
        self.foreign.retain(|_, seen| now - *seen < ttl);

        let claimed: Vec<(SwapId, SwapState)> = self
            .dispatched
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        for (swap_id, state) in claimed {
            match self.store.status(&swap_id).await {
                Ok(Some(SwapStatus::Active)) => {}
                Ok(_) => {
                    self.dispatched.remove_if(&swap_id, |_, current| *current == state);
                }
                Err(e) => {
                    warn!(swap_id = %hex::encode(swap_id), "Could not read swap status: {}", e);
                }
            }
        }
    }

    /// Re-read every active swap from the portal chain after events were dropped
    async fn reconcile(&self) {
        let stored = match self.store.list().await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Could not list swaps to reconcile: {}", e);
                return;
            }
        };

        for entry in stored {
            if entry.status != SwapStatus::Active {
                continue;
            }
            let swap_id = entry.swap.id;
            let remote = match self.chains.portal().get_swap(&swap_id).await {
                Ok(remote) => remote,
                Err(e) => {
                    warn!(swap_id = %entry.swap.id_hex(), "Could not reconcile swap: {}", e);
                    continue;
                }
            };
            if remote.id != swap_id {
                warn!(swap_id = %entry.swap.id_hex(), "Portal returned swap {}", remote.id_hex());
                continue;
            }
            debug!(swap_id = %entry.swap.id_hex(), state = %remote.state, "Reconciling swap");
            if let Err(e) = self.on_snapshot(remote).await {
                self.report(Some(swap_id), e).await;
            }
        }
    }

    /// Propose a swap on the portal chain, keeping its secret locally
    pub async fn create_swap(&self, holder: Party, seeker: Party) -> PortalResult<Swap> {
        for party in [&holder, &seeker] {
            if party.amount == 0 {
                return Err(PortalError::InvalidAmount(format!(
                    "{} amount must be positive",
                    party.symbol
                )));
            }
            self.chains.get(&party.chain)?;
        }
        if holder.is(&seeker.portal_address) {
            return Err(PortalError::InvalidOrder(
                "secret holder and secret seeker must be different parties".to_string(),
            ));
        }
        if !holder.is(&self.config.portal_address) && !seeker.is(&self.config.portal_address) {
            return Err(PortalError::InvalidOrder(format!(
                "{} is not a party to the order",
                self.config.portal_address
            )));
        }

        let order = SwapOrder {
            secret_holder: Party {
                invoice: None,
                receipt: None,
                ..holder
            },
            secret_seeker: Party {
                invoice: None,
                receipt: None,
                ..seeker
            },
        };

        let secret_hash = self.store.create_secret().await?;
        let swap = self
            .chains
            .portal()
            .create_swap(&order, &secret_hash)
            .await?;
        if swap.secret_hash != secret_hash {
            return Err(PortalError::invalid_swap(
                swap.id_hex(),
                "portal returned a different secret hash",
            ));
        }

        let lock = self.swap_lock(&swap.id);
        let _guard = lock.lock().await;
        // The matched event may have been handled already
        if self.store.get(&swap.id).await?.is_none() {
            self.store.put(&swap).await?;
        }

        info!(swap_id = %swap.id_hex(), secret_hash = %hex::encode(secret_hash), "Swap created");
        Ok(swap)
    }

    /// Deposit liquidity and wait until the portal chain mints it
    pub async fn deposit(&self, liquidity: Liquidity) -> PortalResult<Liquidity> {
        if liquidity.amount == 0 {
            return Err(PortalError::InvalidAmount(
                "deposit amount must be positive".to_string(),
            ));
        }
        let chain = self.chains.get(&liquidity.chain)?;

        // Subscribe first so the mint cannot slip past
        let mut events = self.chains.subscribe_events();
        let deposited = chain.deposit(&liquidity).await?;
        info!(
            chain = %liquidity.chain,
            symbol = %liquidity.symbol,
            amount = %liquidity.amount,
            receipt = ?deposited.receipt.as_ref().map(|r| &r.id),
            "Deposit submitted, waiting for mint"
        );

        let minted = async {
            loop {
                match events.recv().await {
                    Ok(ChainEvent::Portal(PortalEvent::AssetMinted { liquidity: minted }))
                        if is_mint_of(&minted, &liquidity) =>
                    {
                        return Ok(minted);
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Deposit waiter lagged, {} events skipped", skipped);
                    }
                    Err(RecvError::Closed) => {
                        return Err(PortalError::InstanceUnavailable(
                            "event bus closed".to_string(),
                        ))
                    }
                }
            }
        };

        match timeout(self.operation_timeout(), minted).await {
            Ok(result) => result,
            Err(_) => Err(PortalError::Timeout {
                operation: format!("mint of {} {} deposit", liquidity.amount, liquidity.symbol),
            }),
        }
    }

    /// Wait until a swap completes or fails.
    ///
    /// Expiry of the wait leaves the swap and any in-flight chain action alone.
    pub async fn wait_for_completion(&self, swap_id: &SwapId) -> PortalResult<Swap> {
        let mut notifications = self.subscribe();
        if let Some(swap) = self.outcome(swap_id).await? {
            return Ok(swap);
        }

        let finished = async {
            loop {
                match notifications.recv().await {
                    Ok(SwapNotification::Completed { swap }) if swap.id == *swap_id => {
                        return Ok(swap)
                    }
                    Ok(SwapNotification::Failed { swap_id: id, error }) if id == *swap_id => {
                        return Err(error)
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(_)) => match self.outcome(swap_id).await {
                        Ok(Some(swap)) => return Ok(swap),
                        Ok(None) => continue,
                        Err(e) => return Err(e),
                    },
                    Err(RecvError::Closed) => {
                        return Err(PortalError::InstanceUnavailable(
                            "orchestrator stopped".to_string(),
                        ))
                    }
                }
            }
        };

        match timeout(self.operation_timeout(), finished).await {
            Ok(result) => result,
            Err(_) => Err(PortalError::Timeout {
                operation: format!("completion of swap {}", hex::encode(swap_id)),
            }),
        }
    }

    /// `Some` once completed, `None` while active, an error if failed or unknown
    async fn outcome(&self, swap_id: &SwapId) -> PortalResult<Option<Swap>> {
        match self.store.status(swap_id).await? {
            None => Err(PortalError::invalid_swap(hex::encode(swap_id), "unknown swap")),
            Some(SwapStatus::Active) => Ok(None),
            Some(SwapStatus::Completed) => self.store.get(swap_id).await,
            Some(SwapStatus::Failed { reason }) => Err(PortalError::invalid_swap(
                hex::encode(swap_id),
                format!("swap failed: {}", reason),
            )),
        }
    }

    /// Reclaim the local party's funds locked for a swap
    pub async fn recover(&self, swap_id: &SwapId) -> PortalResult<()> {
        let lock = self.swap_lock(swap_id);
        let _guard = lock.lock().await;

        let swap = self
            .store
            .get(swap_id)
            .await?
            .ok_or_else(|| PortalError::invalid_swap(hex::encode(swap_id), "unknown swap"))?;
        let role = swap.role_of(&self.config.portal_address).ok_or_else(|| {
            PortalError::invalid_swap(swap.id_hex(), "local party is not part of the swap")
        })?;
        if self.store.status(swap_id).await? == Some(SwapStatus::Completed) {
            return Err(PortalError::invalid_swap(swap.id_hex(), "swap already completed"));
        }

        // The local party's payment went to the counterparty's chain
        let chain_name = &swap.party(role.counterparty()).chain;
        let chain = self.chains.get(chain_name)?;
        chain.recover_locked_funds(&swap).await?;
        info!(swap_id = %swap.id_hex(), chain = %chain_name, "Recovered locked funds");
        Ok(())
    }

    /// Stop the main loop; handlers already running finish on their own
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
        info!("Orchestrator shutdown initiated");
    }
}

fn required_invoice(swap: &Swap, role: Role) -> PortalResult<&Invoice> {
    swap.party(role).invoice.as_ref().ok_or_else(|| {
        PortalError::invalid_swap(swap.id_hex(), format!("{} invoice missing", role))
    })
}

fn is_mint_of(minted: &Liquidity, deposited: &Liquidity) -> bool {
    minted.chain == deposited.chain
        && minted.symbol == deposited.symbol
        && minted.amount == deposited.amount
        && minted.owner.eq_ignore_ascii_case(&deposited.owner)
}
