//! Two relayers, one for each side of a swap, against in-process fake chains

use async_trait::async_trait;
use portal_relayer::chain::{ChainManager, ChainParams, ChainParamsTable, NativeChain, PortalChain};
use portal_relayer::config::RelayerConfig;
use portal_relayer::coordination::{Orchestrator, SwapNotification};
use portal_relayer::events::{EventSink, NativeEvent, PortalEvent};
use portal_relayer::state::{MemoryStore, SwapStatus, SwapStore};
use portal_relayer::swap::{
    Invoice, Leg, Liquidity, Party, Receipt, Role, SecretHash, Swap, SwapDiff, SwapId, SwapOrder,
    SwapState,
};
use portal_relayer::{PortalError, PortalResult};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const HOLDER: &str = "0xa11ce";
const SEEKER: &str = "0xb0b";
const HEIGHT: u64 = 10;

/// State shared by every fake client, standing in for the ledgers themselves
#[derive(Default)]
struct World {
    swap: Mutex<Option<Swap>>,
    portal_sinks: Mutex<Vec<EventSink>>,
    native_sinks: Mutex<Vec<(String, EventSink)>>,
    invoice_timeouts: Mutex<HashMap<String, u64>>,
    payments: Mutex<Vec<(String, Role)>>,
}

impl World {
    fn emit_portal(&self, event: PortalEvent) {
        for sink in self.portal_sinks.lock().unwrap().iter() {
            sink.emit_portal(event.clone()).unwrap();
        }
    }

    fn emit_native(&self, chain: &str, event: NativeEvent) {
        for (name, sink) in self.native_sinks.lock().unwrap().iter() {
            if name == chain {
                sink.emit_native(event.clone()).unwrap();
            }
        }
    }
}

struct FakePortal {
    world: Arc<World>,
}

#[async_trait]
impl PortalChain for FakePortal {
    async fn start(&self, _from_height: u64, sink: EventSink) -> PortalResult<()> {
        self.world.portal_sinks.lock().unwrap().push(sink);
        Ok(())
    }

    async fn stop(&self) -> PortalResult<()> {
        Ok(())
    }

    async fn create_swap(&self, order: &SwapOrder, secret_hash: &SecretHash) -> PortalResult<Swap> {
        let swap = Swap::new(
            [1u8; 32],
            *secret_hash,
            order.secret_holder.clone(),
            order.secret_seeker.clone(),
        );
        *self.world.swap.lock().unwrap() = Some(swap.clone());
        self.world
            .emit_portal(PortalEvent::SwapMatched { swap: swap.clone() });
        Ok(swap)
    }

    async fn register_invoice(
        &self,
        swap_id: &SwapId,
        _secret_hash: &SecretHash,
        _amount: u128,
        invoice: &Invoice,
    ) -> PortalResult<()> {
        let event = {
            let mut guard = self.world.swap.lock().unwrap();
            let swap = guard
                .as_mut()
                .ok_or_else(|| PortalError::Internal("no swap".to_string()))?;
            let (diff, event) = match swap.state {
                SwapState::Matched => (
                    SwapDiff::HolderInvoiced {
                        invoice: invoice.clone(),
                    },
                    PortalEvent::SwapHolderInvoiced {
                        swap_id: *swap_id,
                        invoice: invoice.clone(),
                    },
                ),
                _ => (
                    SwapDiff::SeekerInvoiced {
                        invoice: invoice.clone(),
                    },
                    PortalEvent::SwapSeekerInvoiced {
                        swap_id: *swap_id,
                        invoice: invoice.clone(),
                    },
                ),
            };
            swap.update(&diff)?;
            event
        };
        self.world.emit_portal(event);
        Ok(())
    }

    async fn get_swap(&self, swap_id: &SwapId) -> PortalResult<Swap> {
        self.world
            .swap
            .lock()
            .unwrap()
            .clone()
            .filter(|s| s.id == *swap_id)
            .ok_or_else(|| PortalError::Internal("unknown swap".to_string()))
    }
}

struct FakeNative {
    name: String,
    invoice_timeout: u64,
    world: Arc<World>,
}

impl FakeNative {
    fn new(name: &str, invoice_timeout: u64, world: Arc<World>) -> Self {
        Self {
            name: name.to_string(),
            invoice_timeout,
            world,
        }
    }

    fn receipt(&self, what: &str) -> Receipt {
        Receipt {
            id: format!("{}-{}", self.name, what),
            detail: None,
        }
    }
}

#[async_trait]
impl NativeChain for FakeNative {
    async fn start(&self, _from_height: u64, sink: EventSink) -> PortalResult<()> {
        self.world
            .native_sinks
            .lock()
            .unwrap()
            .push((self.name.clone(), sink));
        Ok(())
    }

    async fn stop(&self) -> PortalResult<()> {
        Ok(())
    }

    async fn deposit(&self, liquidity: &Liquidity) -> PortalResult<Liquidity> {
        Ok(liquidity.clone())
    }

    async fn create_invoice(&self, leg: &Leg) -> PortalResult<Invoice> {
        let id = format!("{}-{}", self.name, leg.role);
        self.world
            .invoice_timeouts
            .lock()
            .unwrap()
            .insert(id.clone(), self.invoice_timeout);
        Ok(Invoice {
            request: format!("pay {} {}", leg.party.amount, leg.party.symbol),
            id,
        })
    }

    async fn pay_invoice(&self, leg: &Leg) -> PortalResult<()> {
        self.world
            .payments
            .lock()
            .unwrap()
            .push((self.name.clone(), leg.role));
        let receipt = self.receipt("payment");
        let event = match leg.role {
            Role::Holder => NativeEvent::SwapHolderPaid {
                swap_id: leg.swap_id,
                receipt,
            },
            Role::Seeker => NativeEvent::SwapSeekerPaid {
                swap_id: leg.swap_id,
                receipt,
            },
        };
        self.world.emit_native(&self.name, event);
        Ok(())
    }

    async fn settle_invoice(&self, leg: &Leg, secret: &[u8]) -> PortalResult<Party> {
        let receipt = self.receipt("settlement");
        let event = match leg.role {
            Role::Seeker => NativeEvent::SwapHolderSettled {
                swap_id: leg.swap_id,
                secret: secret.to_vec(),
                receipt: Some(receipt.clone()),
            },
            Role::Holder => NativeEvent::SwapSeekerSettled {
                swap_id: leg.swap_id,
                receipt: receipt.clone(),
            },
        };
        self.world.emit_native(&self.name, event);

        let mut party = leg.party.clone();
        party.receipt = Some(receipt);
        Ok(party)
    }

    async fn get_block_height(&self) -> PortalResult<u64> {
        Ok(HEIGHT)
    }

    async fn fetch_invoice_timeout(&self, invoice_id: &str) -> PortalResult<u64> {
        self.world
            .invoice_timeouts
            .lock()
            .unwrap()
            .get(invoice_id)
            .copied()
            .ok_or_else(|| PortalError::Internal(format!("unknown invoice {}", invoice_id)))
    }

    async fn recover_locked_funds(&self, _swap: &Swap) -> PortalResult<()> {
        Ok(())
    }
}

/// One relayer instance acting for `address`
async fn relayer(
    address: &str,
    world: &Arc<World>,
    alpha_timeout: u64,
    beta_timeout: u64,
) -> (Arc<Orchestrator>, Arc<MemoryStore>) {
    let mut params = ChainParamsTable::new();
    params.insert("alpha", ChainParams::new(1, 2));
    params.insert("beta", ChainParams::new(1, 2));

    let chains = Arc::new(ChainManager::new(
        Arc::new(FakePortal {
            world: world.clone(),
        }),
        params,
        Duration::from_secs(5),
    ));
    chains
        .register_native("alpha", Arc::new(FakeNative::new("alpha", alpha_timeout, world.clone())))
        .unwrap();
    chains
        .register_native("beta", Arc::new(FakeNative::new("beta", beta_timeout, world.clone())))
        .unwrap();

    let store = Arc::new(MemoryStore::new());
    let mut config = RelayerConfig::new(address);
    config.operation_timeout_secs = 10;
    let orchestrator = Arc::new(Orchestrator::new(chains.clone(), store.clone(), config));

    tokio::spawn(orchestrator.clone().run());
    // Let the run loop subscribe before any event is published
    tokio::time::sleep(Duration::from_millis(20)).await;
    chains.start_all(store.as_ref()).await.unwrap();

    (orchestrator, store)
}

fn parties() -> (Party, Party) {
    (
        Party::new(HOLDER, "alpha", "ALP", "0xalpha", 1_000),
        Party::new(SEEKER, "beta", "BET", "0xbeta", 20),
    )
}

async fn next_completion(rx: &mut tokio::sync::broadcast::Receiver<SwapNotification>) -> Swap {
    loop {
        match rx.recv().await.unwrap() {
            SwapNotification::Completed { swap } => return swap,
            SwapNotification::Failed { error, .. } => panic!("swap failed: {}", error),
            _ => continue,
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_full_swap_between_two_relayers() {
    let world = Arc::new(World::default());
    let (holder, holder_store) = relayer(HOLDER, &world, 1_000, 100).await;
    let (seeker, seeker_store) = relayer(SEEKER, &world, 1_000, 100).await;
    let mut holder_events = holder.subscribe();

    let (holder_party, seeker_party) = parties();
    let swap = seeker.create_swap(holder_party, seeker_party).await.unwrap();

    let seeker_view = seeker.wait_for_completion(&swap.id).await.unwrap();
    let holder_view = tokio::time::timeout(Duration::from_secs(10), next_completion(&mut holder_events))
        .await
        .unwrap();

    for view in [&seeker_view, &holder_view] {
        assert_eq!(view.state, SwapState::SeekerSettled);
        assert!(view.secret().is_some());
        assert_eq!(view.secret_seeker.invoice.as_ref().unwrap().id, "beta-secretSeeker");
        assert_eq!(view.secret_holder.invoice.as_ref().unwrap().id, "alpha-secretHolder");
    }

    for store in [&holder_store, &seeker_store] {
        assert_eq!(store.status(&swap.id).await.unwrap(), Some(SwapStatus::Completed));
    }

    // The seeker paid on alpha, the holder paid on beta, once each
    let payments = world.payments.lock().unwrap().clone();
    assert_eq!(
        payments,
        vec![("alpha".to_string(), Role::Holder), ("beta".to_string(), Role::Seeker)]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unsafe_counterparty_timeout_stops_the_swap() {
    let world = Arc::new(World::default());
    // The holder's lock on alpha expires before the seeker's lock on beta
    let (_holder, holder_store) = relayer(HOLDER, &world, 50, 100).await;
    let (seeker, seeker_store) = relayer(SEEKER, &world, 50, 100).await;
    let mut seeker_events = seeker.subscribe();

    let (holder_party, seeker_party) = parties();
    let swap = seeker.create_swap(holder_party, seeker_party).await.unwrap();

    let failure = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Ok(SwapNotification::Failed { error, .. }) = seeker_events.recv().await {
                return error;
            }
        }
    })
    .await
    .unwrap();

    assert!(matches!(failure, PortalError::UnsafeTimeout { .. }));
    assert!(matches!(
        seeker_store.status(&swap.id).await.unwrap(),
        Some(SwapStatus::Failed { .. })
    ));
    assert!(world.payments.lock().unwrap().is_empty());
    assert_ne!(
        holder_store.status(&swap.id).await.unwrap(),
        Some(SwapStatus::Completed)
    );
}
