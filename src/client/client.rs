use crate::config::FramingConfig;
use crate::transport::connection::{FramedConnection, TcpFramedConnection};
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{info, warn};

/// Separates orders in an orders file
pub const ORDER_SEPARATOR: &str = "=-=\n";

/// Follows every answer in the answers output
pub const ANSWER_SEPARATOR: &str = "\n=-=\n";

#[derive(Parser, Debug)]
pub struct ClientArgs {
    /// Server address like 127.0.0.1:51131
    #[arg(short, long, default_value = "127.0.0.1:51131")]
    pub addr: String,

    /// File with the orders to send, separated by `=-=` lines
    #[arg(short, long)]
    pub orders: PathBuf,

    /// File to write the answers to; stdout when omitted
    #[arg(long)]
    pub answers: Option<PathBuf>,

    /// Idle timeout while waiting for an answer, in milliseconds (0 = none)
    #[arg(long, default_value_t = 0)]
    pub read_timeout_ms: u64,
}

/// Splits the content of an orders file into single orders, skipping blank ones
pub fn split_orders(orders: &str) -> Vec<&str> {
    orders
        .split(ORDER_SEPARATOR)
        .filter(|order| !order.trim().is_empty())
        .collect()
}

/// Sends each order as one frame and collects the answer frames in order
pub async fn exchange_orders<R, W>(
    conn: &mut FramedConnection<R, W>,
    orders: &[&str],
) -> anyhow::Result<Vec<String>>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut answers = Vec::with_capacity(orders.len());
    for order in orders {
        info!("Sending order of {} bytes to {}", order.len(), conn);
        conn.write_frame(order).await?;

        let answer = conn.read_frame(None).await?;
        if let Some(error) = answer.error() {
            warn!("Answer from {} could not be read: {}", conn, error);
        }
        answers.push(answer.into_text());
    }
    Ok(answers)
}

pub async fn run_client(args: ClientArgs) -> anyhow::Result<()> {
    let orders = tokio::fs::read_to_string(&args.orders)
        .await
        .with_context(|| format!("Unable to open orders file {}", args.orders.display()))?;
    let orders = split_orders(&orders);

    let stream = TcpStream::connect(&args.addr).await?;
    let config = FramingConfig::new().with_read_timeout(Duration::from_millis(args.read_timeout_ms));
    let mut conn = TcpFramedConnection::from_tcp(stream, &config)?;

    let answers = exchange_orders(&mut conn, &orders).await;
    conn.close().await;
    let answers = answers?;

    let mut output = String::new();
    for answer in &answers {
        output.push_str(answer);
        output.push_str(ANSWER_SEPARATOR);
    }

    match &args.answers {
        Some(path) => tokio::fs::write(path, output)
            .await
            .with_context(|| format!("Unable to write answers to {}", path.display()))?,
        None => print!("{}", output),
    }
    info!("Received {} answers", answers.len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_orders() {
        let orders = "version: 5.0\naction: LOGIN\n=-=\nversion: 5.0\naction: CHECK\n=-=\n";
        assert_eq!(
            split_orders(orders),
            vec!["version: 5.0\naction: LOGIN\n", "version: 5.0\naction: CHECK\n"]
        );
    }

    #[test]
    fn test_split_orders_skips_blank_orders() {
        assert!(split_orders("").is_empty());
        assert_eq!(split_orders("a\n=-=\n\n=-=\nb"), vec!["a\n", "b"]);
    }
}
