use std::env;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use subwatch::config::BackfillRange;
use subwatch::config::ChainConfig;
use subwatch::config::PostgresConfig;
use subwatch::constants::FANOUT_CONCURRENCY;
use subwatch::constants::SHUTDOWN_GRACE;
use subwatch::core::ChainClient;
use subwatch::core::Node;
use subwatch::monitor::Monitor;
use subwatch::rewards::EraComputer;
use subwatch::rewards::RoundComputer;
use subwatch::store::schema;
use subwatch::tasks::Consumer;
use subwatch::tasks::Dispatcher;
use subwatch::tasks::MemoryBroker;
use subwatch::tasks::MessageQueue;
use subwatch::tasks::QueueName;
use subwatch::tasks::TaskKind;
use subwatch::tasks::TaskProcessor;
use subwatch::tasks::TaskStore;
use subwatch::workers;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<(), &'static str> {
    // Configure tracing subscriber
    let filter = env::var("SW_LOG").unwrap_or(String::from("subwatch=info"));
    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_max_level(tracing::Level::INFO)
        .with_env_filter(filter)
        .finish();

    let _guard = tracing::subscriber::set_global_default(subscriber);

    tracing::info!("starting subwatch v{VERSION}");
    if cfg!(feature = "test-utilities") {
        tracing::warn!("build includes test-utilities, use cargo's `--no-default-features` flag");
    } else {
        tracing::debug!("compiled without test-utilities");
    }

    // Env variables
    let pg_uri = env::var("SW_POSTGRES_URI").unwrap();
    tracing::debug!("found SW_POSTGRES_URI environment variable");

    let node_url = env::var("SW_NODE_URL").unwrap();
    tracing::debug!("found SW_NODE_URL environment variable");

    let chain_config = chain_config_from_env()?;
    let backfill = backfill_from_env();
    let start_height: i64 = env::var("SW_START_HEIGHT")
        .map(|v| v.parse().expect("SW_START_HEIGHT is a height"))
        .unwrap_or(0);

    let pgconf = PostgresConfig::new(&pg_uri);
    init_schema(&pgconf).await;

    let node: Arc<dyn ChainClient> = Arc::new(Node::new("gateway", &node_url));
    let broker: Arc<dyn MessageQueue> = Arc::new(MemoryBroker::new());

    tracing::info!("configuring dispatcher");
    let task_store = TaskStore::new(&pgconf).await;
    let mut monitor = Monitor::new();
    let mut dispatcher =
        Dispatcher::new(task_store, broker.clone(), node.clone(), monitor.sender());
    let pause = dispatcher.pause_flag();
    let shutdown = dispatcher.shutdown_flag();

    // Consumers, one per queue
    let mut block_consumer = Consumer::new(
        "blocks",
        QueueName::Blocks,
        broker.clone(),
        TaskProcessor::new(&pgconf, broker.clone()).await.with_handler(
            TaskKind::Block,
            Box::new(workers::BlockWorker::new(node.clone(), chain_config.clone())),
        ),
        monitor.sender(),
    );

    let mut staking_consumer = Consumer::new(
        "staking",
        QueueName::Staking,
        broker.clone(),
        TaskProcessor::new(&pgconf, broker.clone())
            .await
            .with_handler(
                TaskKind::Era,
                Box::new(workers::EraWorker::new(EraComputer::new(
                    node.clone(),
                    FANOUT_CONCURRENCY,
                ))),
            )
            .with_handler(
                TaskKind::Round,
                Box::new(workers::RoundWorker::new(RoundComputer::new(
                    node.clone(),
                    FANOUT_CONCURRENCY,
                    chain_config.reward_payment_delay,
                ))),
            ),
        monitor.sender(),
    );

    let mut balance_consumer = Consumer::new(
        "balances",
        QueueName::Balances,
        broker.clone(),
        TaskProcessor::new(&pgconf, broker.clone()).await.with_handler(
            TaskKind::BlockBalance,
            Box::new(workers::BalanceWorker::new(node.clone(), FANOUT_CONCURRENCY)),
        ),
        monitor.sender(),
    );

    let mut metadata_consumer = Consumer::new(
        "metadata",
        QueueName::BlocksMetadata,
        broker.clone(),
        TaskProcessor::new(&pgconf, broker.clone()).await.with_handler(
            TaskKind::BlockMetadata,
            Box::new(workers::MetadataWorker::new(
                node.clone(),
                chain_config.family,
            )),
        ),
        monitor.sender(),
    );

    // Start monitor
    let monitor_pause = pause.clone();
    tokio::spawn(async move {
        monitor.start(monitor_pause).await;
    });

    // Start consumers
    tokio::spawn(async move {
        block_consumer.start().await;
    });
    tokio::spawn(async move {
        staking_consumer.start().await;
    });
    tokio::spawn(async move {
        balance_consumer.start().await;
    });
    tokio::spawn(async move {
        metadata_consumer.start().await;
    });

    // Start dispatcher: optional historical backfill, then follow the
    // finalized head
    let dispatcher_handle = tokio::spawn(async move {
        if let Some(range) = backfill {
            if let Err(e) = dispatcher.index_range(range.from, range.to).await {
                tracing::error!("backfill failed: {e}");
                return;
            }
        }
        if let Err(e) = dispatcher.follow_finalized(start_height).await {
            tracing::error!("dispatcher failed: {e}");
        }
    });

    // Wait for ctrl-c, then give in-flight work a bounded grace period
    _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutting down");
    shutdown.store(true, Ordering::Relaxed);
    if tokio::time::timeout(SHUTDOWN_GRACE, dispatcher_handle)
        .await
        .is_err()
    {
        tracing::warn!("dispatcher did not finish within the grace period");
    }
    tracing::info!("exiting");
    Ok(())
}

fn chain_config_from_env() -> Result<ChainConfig, &'static str> {
    let family = env::var("SW_CHAIN_FAMILY").map_err(|_| "SW_CHAIN_FAMILY is not set")?;
    let mut config = match family.as_str() {
        "relay" => ChainConfig::relay(),
        "parachain" => {
            let delay = env::var("SW_REWARD_PAYMENT_DELAY")
                .map(|v| v.parse().expect("SW_REWARD_PAYMENT_DELAY is a number"))
                .unwrap_or(2);
            ChainConfig::parachain(delay)
        }
        _ => return Err("SW_CHAIN_FAMILY must be `relay` or `parachain`"),
    };
    if env::var("SW_TRACK_BALANCES").map(|v| v == "1").unwrap_or(false) {
        config = config.with_balance_tracking();
    }
    if env::var("SW_TRACK_METADATA").map(|v| v == "1").unwrap_or(false) {
        config = config.with_metadata_tracking();
    }
    Ok(config)
}

fn backfill_from_env() -> Option<BackfillRange> {
    let from = env::var("SW_BACKFILL_FROM").ok()?;
    let to = env::var("SW_BACKFILL_TO").ok()?;
    Some(BackfillRange {
        from: from.parse().expect("SW_BACKFILL_FROM is a height"),
        to: to.parse().expect("SW_BACKFILL_TO is a height"),
    })
}

async fn init_schema(pgconf: &PostgresConfig) {
    let (mut client, connection) =
        tokio_postgres::connect(&pgconf.connection_uri, tokio_postgres::NoTls)
            .await
            .unwrap();
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("connection error: {}", e);
        }
    });
    schema::init(&mut client).await;
}
