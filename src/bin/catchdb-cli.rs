//! CatchDB CLI Client
//!
//! Interactive prompt for a CatchDB server. Each line is split on
//! whitespace into request blocks; the reply is printed as its status
//! followed by the quoted result blocks.

use anyhow::Context;
use catchdb::client::Client;
use catchdb::protocol::command::{lookup, COMMAND_TABLE};
use catchdb::{DEFAULT_HOST, DEFAULT_PORT};
use clap::Parser;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};

/// CatchDB CLI
#[derive(Parser, Debug)]
#[command(name = "catchdb-cli")]
#[command(about = "Interactive client for the CatchDB server")]
#[command(version)]
struct Args {
    /// Server host
    #[arg(long, env = "CATCHDB_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Server port
    #[arg(short, long, env = "CATCHDB_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Run a single command and exit instead of starting the prompt
    command: Vec<String>,
}

fn print_help(topic: Option<&str>) {
    match topic {
        None => {
            println!("help cmd\t\tshow usage of the cmd");
            println!("quit, q\t\t\texit");
            println!();
            let names: Vec<&str> = COMMAND_TABLE.iter().map(|spec| spec.name).collect();
            println!("commands: {}", names.join(" "));
        }
        Some(name) => match lookup(name.as_bytes()) {
            Some(spec) => println!("{}", spec),
            None => println!("Unknown command '{}'", name),
        },
    }
}

async fn run_once(client: &mut Client, words: &[&str]) -> anyhow::Result<()> {
    let reply = client.request(words).await.context("request failed")?;
    println!("{}", reply);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);
    let mut client = Client::connect(&addr)
        .await
        .with_context(|| format!("cannot connect to {}", addr))?;

    if !args.command.is_empty() {
        let words: Vec<&str> = args.command.iter().map(String::as_str).collect();
        return run_once(&mut client, &words).await;
    }

    let mut lines = BufReader::new(io::stdin()).lines();
    let mut stdout = io::stdout();
    loop {
        stdout.write_all(format!("{}> ", addr).as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => continue,
            ["quit"] | ["q"] => break,
            ["help"] | ["?"] => print_help(None),
            ["help", topic] | ["?", topic] => print_help(Some(*topic)),
            ["help", ..] | ["?", ..] => {
                println!("Unrecognized Command. Perhaps you mean \"help cmd\" or \"? cmd\"")
            }
            _ => {
                if let Err(e) = run_once(&mut client, &words).await {
                    eprintln!("{:#}", e);
                    break;
                }
            }
        }
    }
    Ok(())
}
