use clap::Parser;
use evsim::{
    apps::{run, FlowId, FlowSpec, Interval, Link, NodeId, Scenario},
    core::{BitsPerSec, Bytes, Mbps, Time},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of flows sharing the bottleneck
    #[arg(short, long, default_value_t = 4)]
    flows: usize,

    /// Packet size
    #[arg(short, long, default_value = "1000")]
    packet_size: Bytes,

    /// Aggregate offered load as a fraction of the bottleneck bandwidth
    #[arg(short, long, default_value_t = 0.7)]
    load: f64,

    /// Simulated duration, e.g. 10s or 500ms
    #[arg(short, long, default_value = "10s")]
    duration: Time,

    /// Bottleneck bandwidth
    #[arg(short, long, default_value = "10")]
    bandwidth: Mbps,

    /// Bottleneck propagation delay
    #[arg(long, default_value = "2ms")]
    delay: Time,

    /// Packets that may queue at the bottleneck
    #[arg(short, long)]
    queue_limit: Option<usize>,

    /// Random seed
    #[arg(short, long, default_value_t = 0)]
    seed: u64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    anyhow::ensure!(args.flows > 0, "need at least one flow");
    anyhow::ensure!(args.load > 0.0, "load must be positive");
    anyhow::ensure!(
        args.duration > Time::ZERO,
        "duration must be positive, got {}",
        args.duration
    );

    let scenario = poisson_scenario(&args)?;
    let report = run(scenario)?;

    println!("flow  tx      rx      dropped  throughput(Mbps)  mean delay(ms)  loss");
    for (id, stats) in &report.flows {
        let delay = stats
            .mean_delay()
            .map(|d| format!("{:.3}", d.as_secs_f64() * 1e3))
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<5} {:<7} {:<7} {:<8} {:<17.3} {:<15} {:.4}",
            id.inner(),
            stats.tx_packets,
            stats.rx_packets,
            stats.dropped,
            stats.throughput() / 1e6,
            delay,
            stats.loss_ratio()
        );
    }
    let summary = &report.summary;
    println!(
        "{} events executed, {} cancelled, stopped at {:.3}s",
        summary.executed,
        summary.skipped,
        summary.end_time.as_secs_f64()
    );
    Ok(())
}

/// All flows go from node 0 to node 1 over a single link, so they share its queue. Each flow
/// offers `load / flows` of the link bandwidth with exponentially distributed packet gaps.
fn poisson_scenario(args: &Args) -> anyhow::Result<Scenario> {
    let src = NodeId::new(0);
    let dst = NodeId::new(1);
    let bandwidth = BitsPerSec::from(args.bandwidth);
    let per_flow_rate = bandwidth.scale_by(args.load / args.flows as f64);
    anyhow::ensure!(per_flow_rate > BitsPerSec::ZERO, "load is too low");
    let mean =
        Time::from_secs_f64(args.packet_size.into_f64() * 8.0 / per_flow_rate.into_f64());
    anyhow::ensure!(mean > Time::ZERO, "load is too high for the packet size");
    log::info!("mean packet gap per flow: {mean}");

    let link = Link {
        a: src,
        b: dst,
        bandwidth,
        delay: args.delay,
        queue_limit: args.queue_limit,
    };
    let flows = (0..args.flows)
        .map(|i| {
            FlowSpec::builder()
                .id(FlowId::new(i))
                .src(src)
                .dst(dst)
                .packet_size(args.packet_size)
                .interval(Interval::Exponential { mean })
                .start(Time::ZERO)
                .stop(args.duration)
                .build()
        })
        .collect();
    Ok(Scenario::builder()
        .seed(args.seed)
        .stop_time(args.duration)
        .links(vec![link])
        .flows(flows)
        .build())
}
