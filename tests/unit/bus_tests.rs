//! Unit tests for the synchronous event bus.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use attention_alert::bus::{EventBus, SubscriberRef};
use attention_alert::models::AgentEvent;
use attention_alert::{AppError, Result};

fn counter(hits: &Arc<AtomicUsize>) -> SubscriberRef {
    let hits = Arc::clone(hits);
    Arc::new(move |_event: &AgentEvent| -> Result<()> {
        hits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

#[test]
fn publish_reaches_subscribers_in_registration_order() {
    let bus = EventBus::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    for label in ["first", "second", "third"] {
        let order = Arc::clone(&order);
        bus.subscribe(Arc::new(move |_event: &AgentEvent| -> Result<()> {
            order.lock().unwrap().push(label);
            Ok(())
        }));
    }

    bus.publish(&AgentEvent::simple("execution_running", "test"));
    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
}

#[test]
fn subscribing_the_same_handle_twice_is_a_no_op() {
    let bus = EventBus::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let subscriber = counter(&hits);

    bus.subscribe(Arc::clone(&subscriber));
    bus.subscribe(Arc::clone(&subscriber));
    assert_eq!(bus.subscriber_count(), 1);

    bus.publish(&AgentEvent::simple("stdin_request", "test"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn unsubscribe_stops_delivery() {
    let bus = EventBus::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let subscriber = counter(&hits);

    bus.subscribe(Arc::clone(&subscriber));
    bus.unsubscribe(&subscriber);
    bus.unsubscribe(&subscriber);

    bus.publish(&AgentEvent::simple("stdin_request", "test"));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(bus.subscriber_count(), 0);
}

#[test]
fn failing_and_panicking_subscribers_do_not_block_others() {
    let bus = EventBus::new();
    let hits = Arc::new(AtomicUsize::new(0));

    bus.subscribe(Arc::new(|_event: &AgentEvent| -> Result<()> {
        Err(AppError::Backend("nope".into()))
    }));
    bus.subscribe(Arc::new(|_event: &AgentEvent| -> Result<()> {
        panic!("subscriber blew up");
    }));
    bus.subscribe(counter(&hits));

    bus.publish(&AgentEvent::simple("awaiting_confirmation", "test"));
    bus.publish(&AgentEvent::simple("awaiting_confirmation", "test"));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn subscriber_may_unsubscribe_itself_during_publish() {
    let bus = Arc::new(EventBus::new());
    let hits = Arc::new(AtomicUsize::new(0));
    let slot: Arc<Mutex<Option<SubscriberRef>>> = Arc::new(Mutex::new(None));

    let self_removing: SubscriberRef = {
        let bus = Arc::clone(&bus);
        let slot = Arc::clone(&slot);
        let hits = Arc::clone(&hits);
        Arc::new(move |_event: &AgentEvent| -> Result<()> {
            hits.fetch_add(1, Ordering::SeqCst);
            if let Some(me) = slot.lock().unwrap().take() {
                bus.unsubscribe(&me);
            }
            Ok(())
        })
    };
    *slot.lock().unwrap() = Some(Arc::clone(&self_removing));
    bus.subscribe(self_removing);

    bus.publish(&AgentEvent::simple("stdin_request", "test"));
    bus.publish(&AgentEvent::simple("stdin_request", "test"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn concurrent_publishers_lose_no_invocations() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 250;

    let bus = EventBus::new();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    bus.subscribe(counter(&first));
    bus.subscribe(counter(&second));

    thread::scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|| {
                for _ in 0..PER_THREAD {
                    bus.publish(&AgentEvent::simple("execution_stalled", "watchdog"));
                }
            });
        }
    });

    assert_eq!(first.load(Ordering::SeqCst), THREADS * PER_THREAD);
    assert_eq!(second.load(Ordering::SeqCst), THREADS * PER_THREAD);
}
