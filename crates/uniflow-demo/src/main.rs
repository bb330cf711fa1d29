//! Simulated download manager on top of a uniflow store
//!
//! Two queues fetch files one at a time each; both feed the same store.

use futures::FutureExt;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::mpsc;
use std::time::Duration;
use uniflow::middleware::logging::logging;
use uniflow::{
    AsyncActionCreator, Dispatch, GetState, Middleware, Monoid, Reducer, Store, StoreConfig, StoreQueue, Teardown,
};

#[derive(Debug, Clone)]
enum Action {
    Started(String),
    Finished { name: String, bytes: u64 },
    Failed(String),
}

#[derive(Debug, Clone, Default)]
struct Downloads {
    in_flight: Vec<String>,
    finished: Vec<String>,
    failed: Vec<String>,
    total_bytes: u64,
}

fn reducer() -> Reducer<Downloads, Action> {
    Reducer::new(|state: &mut Downloads, action: &Action| match action {
        Action::Started(name) => state.in_flight.push(name.clone()),
        Action::Finished { name, bytes } => {
            state.in_flight.retain(|n| n != name);
            state.finished.push(name.clone());
            state.total_bytes += bytes;
        }
        Action::Failed(name) => {
            state.in_flight.retain(|n| n != name);
            state.failed.push(name.clone());
        }
    })
}

/// Counts finished downloads and reports the tally when the store goes away
fn tally() -> Middleware<Downloads, Action> {
    Middleware::new(|_: Dispatch<Action>, _: GetState<Downloads>, teardown: &Teardown| {
        let finished = Rc::new(Cell::new(0u32));
        let reported = finished.clone();
        teardown.on_release(move || log::info!("Store released after {} download(s)", reported.get()));

        move |action: Action, next: &dyn Fn(Action)| {
            if matches!(action, Action::Finished { .. }) {
                finished.set(finished.get() + 1);
            }
            next(action)
        }
    })
}

fn download(name: &'static str, bytes: u64, delay_ms: u64) -> AsyncActionCreator<Downloads, Action> {
    AsyncActionCreator::new(move |dispatch: Dispatch<Action>, _: GetState<Downloads>| {
        dispatch.dispatch(Action::Started(name.to_string()));
        async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            if bytes == 0 {
                dispatch.dispatch(Action::Failed(name.to_string()));
                anyhow::bail!("{} is empty", name);
            }
            dispatch.dispatch(Action::Finished {
                name: name.to_string(),
                bytes,
            });
            Ok(())
        }
        .boxed()
    })
}

fn wait_until_drained(queue: &StoreQueue<Downloads, Action>) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel();
    queue.add_completion(move || {
        let _ = tx.send(());
    });
    rx.recv_timeout(Duration::from_secs(10))?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = StoreConfig::load_or_default("uniflow.toml");
    log::info!("Starting uniflow demo with {} async worker(s)", config.async_worker_threads);

    let middleware = Middleware::concat([logging(log::Level::Debug), tally()]);
    let store = Store::with_config(config, reducer(), Downloads::default(), Some(middleware))?;
    let mut states = store.state_stream();

    let images = StoreQueue::new(&store);
    let documents = StoreQueue::new(&store);

    images.enqueue(&download("cat.png", 2_048, 300));
    images.enqueue(&download("dog.png", 4_096, 100));
    documents.enqueue(&download("notes.txt", 512, 50));
    let broken = documents.enqueue(&download("empty.pdf", 0, 50));
    documents.enqueue(&download("report.pdf", 8_192, 150));

    wait_until_drained(&images)?;
    wait_until_drained(&documents)?;

    if let Err(e) = broken.wait_blocking() {
        log::info!("Expected failure: {}", e);
    }

    let summary = store.state();
    log::info!(
        "Finished {:?}, failed {:?}, {} bytes total",
        summary.finished,
        summary.failed,
        summary.total_bytes
    );
    log::info!("Observed {} state change(s)", states.drain().len());

    Ok(())
}
