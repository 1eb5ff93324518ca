//! Minimal end-to-end demo: register, vote, rotate the key, and open
//! the published messages from the coordinator's side, all in-process.
//!
//! Useful for eyeballing the wire layout (ten decimal field elements
//! plus the ephemeral key pair) and for checking that a message the
//! client produces is exactly what a coordinator can open.
//!
//! ```text
//! vote_demo [--choice N] [--weight N] [--budget N] [--seed HEXBYTE]
//! ```

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};

use maci_client::message::{open_message, verify_opened};
use maci_client::{
    Bn254Suite, Keypair, MemoryBackend, MemoryPublisher, ProposalDescriptor, RngSource,
    VotingClient,
};

fn parse_flag(args: &[String], key: &str) -> Option<String> {
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if a == key {
            return it.next().cloned();
        }
    }
    None
}

fn parse_u64(args: &[String], key: &str, default: u64) -> Result<u64> {
    match parse_flag(args, key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("{key} expects an unsigned integer, got {raw:?}")),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let choice = parse_u64(&args, "--choice", 1)?;
    let weight = parse_u64(&args, "--weight", 1)?;
    let budget = parse_u64(&args, "--budget", 35)?;
    let seed_byte = parse_u64(&args, "--seed", 0x42)? as u8;

    // Everything below is deterministic from the seed so runs are
    // reproducible; a real deployment uses RngSource::System.
    let coordinator = Keypair::from_seed([0x02; 32]);
    let proposal = ProposalDescriptor::new(
        "0xdemo-poll",
        0,
        coordinator.pk,
        2,
        budget,
        10,
        None,
    )?;

    let client = VotingClient::new(
        MemoryPublisher::new(),
        Arc::new(Bn254Suite::new(RngSource::Seeded([seed_byte; 32]))),
        Arc::new(MemoryBackend::new()),
    );

    let voter = "0xdemo-voter";
    let state_index = client.register(&proposal, voter, Some([0x01; 32]), &[], &[])?;
    println!("registered: state index {state_index}");

    client.vote(&proposal, voter, choice, weight)?;
    println!("voted: choice {choice}, weight {weight}, cost {}", weight * weight);

    client.change_key(&proposal, voter)?;
    println!("rotated the voter key");

    let ballot = client
        .ballot(&proposal, voter)?
        .context("ballot should exist after voting")?;
    println!(
        "ballot: next nonce {}, key changes {}",
        ballot.next_nonce, ballot.key_change_nonce
    );

    // Coordinator's view of the message board.
    let suite = Bn254Suite::new(RngSource::Seeded([0u8; 32]));
    for (i, (poll, message)) in client.publisher().published().iter().enumerate() {
        println!("\nmessage {i} on {poll}:");
        for (slot, value) in message.data_decimal().iter().enumerate() {
            println!("  data[{slot}] = {value}");
        }
        let opened = open_message(message, &coordinator.sk, &suite)?;
        println!(
            "  opens to: stateIndex={} option={} weight={} nonce={} poll={}",
            opened.command.state_index,
            opened.command.vote_option_index,
            opened.command.new_vote_weight,
            opened.command.nonce,
            opened.command.poll_id,
        );
        let signer = Keypair::from_seed([0x01; 32]).pk;
        let verdict = match verify_opened(&opened, &signer, &suite) {
            Ok(()) => "verifies against the original key",
            Err(_) => "signed by a rotated key",
        };
        println!("  signature: {verdict}");
    }

    Ok(())
}
