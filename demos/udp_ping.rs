use std::sync::Arc;
use std::time::Duration;
use udp_ping::{
    IpVersion, PingConfig, PingProducer, PingResult, RuntimeClock, SessionInitiation, StaticSessionInitiator,
    TokioUdpTransport,
};

type GenericError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(argh::FromArgs)]
/// udp-ping - measure round trip times against a UDP ping server
struct Args {
    #[argh(option, short = 'c', default = "10")]
    /// stop after <count> results
    count: usize,

    #[argh(option, short = 'i', default = "500")]
    /// milliseconds between two pings
    interval_ms: u64,

    #[argh(option, short = 'W', default = "1000")]
    /// milliseconds to wait for a reply
    timeout_ms: u64,

    #[argh(switch, short = '6')]
    /// the server is reached over IPv6
    ipv6: bool,

    #[argh(switch, short = 'v')]
    /// log protocol details
    verbose: bool,

    #[argh(positional)]
    /// server host name or address
    host: String,

    #[argh(positional)]
    /// server port
    port: String,

    #[argh(positional)]
    /// base64 session token
    token: String,
}

#[tokio::main]
async fn main() -> Result<(), GenericError> {
    let args: Args = argh::from_env();

    let level = if args.verbose { tracing::Level::TRACE } else { tracing::Level::INFO };
    let subscriber = tracing_subscriber::FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let initiator = StaticSessionInitiator::new(SessionInitiation {
        server_address: args.host,
        server_port: args.port,
        token: args.token,
        ip_version: Some(if args.ipv6 { IpVersion::V6 } else { IpVersion::V4 }),
    });
    let config = PingConfig::new()
        .with_interval(Duration::from_millis(args.interval_ms))
        .with_timeout(Duration::from_millis(args.timeout_ms));

    let mut producer =
        PingProducer::new(Arc::new(initiator), TokioUdpTransport::new, Arc::new(RuntimeClock::new()), config)?;

    let mut seen = 0;
    while seen < args.count {
        let Some(result) = producer.next().await else {
            break;
        };
        seen += 1;
        match result {
            PingResult::Interval(rtt) => println!("{seen}: {:.3} ms", rtt.as_secs_f64() * 1000.0),
            PingResult::Error(e) => println!("{seen}: {e}"),
        }
    }

    let statistics = producer.statistics();
    println!(
        "{} sent, {} received, {} timed out, {} failed, {:.1}% loss, {} reinitiations",
        statistics.sent,
        statistics.succeeded,
        statistics.timed_out,
        statistics.failed,
        statistics.loss() * 100.0,
        statistics.reinitiations
    );
    if let (Some(min), Some(mean), Some(max)) = (statistics.min, statistics.mean(), statistics.max) {
        println!("rtt min/avg/max = {min:?}/{mean:?}/{max:?}");
    }
    Ok(())
}
