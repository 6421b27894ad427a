// File: main.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

mod cli;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use cli::{AttackArgs, Cli, Commands, DiffArgs, EncodeArgs, H2Args, SendArgs, TraversalArgs};
use colored::*;
use log::debug;
use rwire::request::{LineEnding, RequestPlan, Scheme, Target};
use rwire::response::RawResponse;
use rwire::transport::{ProxyAuth, ProxyOptions, ProxyProtocol, SendOptions, TlsOptions};
use rwire::{attacks, diff, encoder, h2, transport};
use url::Url;

fn parse_target(raw: &str) -> Result<(Target, String)> {
    let url = Url::parse(raw).with_context(|| format!("invalid target URL: {}", raw))?;
    let scheme = match url.scheme() {
        "http" => Scheme::Http,
        "https" => Scheme::Https,
        other => bail!("unsupported scheme: {}", other),
    };
    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("target URL has no host"))?
        .to_string();
    let port = url.port().unwrap_or(scheme.default_port());
    let mut path = url.path().to_string();
    if let Some(q) = url.query() {
        path.push('?');
        path.push_str(q);
    }
    if path.is_empty() {
        path = "/".to_string();
    }
    Ok((Target::new(&host, port, scheme), path))
}

fn send_options(cli: &Cli) -> Result<SendOptions> {
    let proxy = match &cli.proxy.proxy_host {
        Some(host) => {
            let protocol = ProxyProtocol::from_name(&cli.proxy.proxy_protocol)
                .ok_or_else(|| anyhow!("unknown proxy protocol: {}", cli.proxy.proxy_protocol))?;
            let auth = match (&cli.proxy.proxy_user, &cli.proxy.proxy_pass) {
                (Some(user), Some(pass)) => Some(ProxyAuth {
                    username: user.clone(),
                    password: pass.clone(),
                }),
                _ => None,
            };
            Some(ProxyOptions {
                host: host.clone(),
                port: cli.proxy.proxy_port,
                protocol,
                auth,
            })
        }
        None => None,
    };

    Ok(SendOptions {
        timeout_ms: cli.timeout_ms,
        collect_timing: cli.timing,
        tls: TlsOptions {
            reject_unauthorized: cli.verify_tls,
            ..Default::default()
        },
        proxy,
        keep_alive: false,
    })
}

fn print_response(resp: &RawResponse) {
    let status = match resp.status_code {
        200..=299 => resp.status_code.to_string().green(),
        300..=399 => resp.status_code.to_string().yellow(),
        400..=599 => resp.status_code.to_string().red(),
        _ => resp.status_code.to_string().bright_red(),
    };
    println!(
        "{} HTTP/{} {} ({} header lines, {} body bytes)",
        status,
        resp.http_version,
        resp.status_message,
        resp.headers.len(),
        resp.body.len()
    );
    if let Some(err) = &resp.parse_error {
        println!("{} {}", "parse error:".bright_red(), err);
    }
    for (name, value) in resp.headers.entries() {
        println!("  {}: {}", name.cyan(), value);
    }
    if let Some(timing) = &resp.timing {
        println!(
            "{} connect {}ms, ttfb {}ms, total {}ms",
            "timing:".bold(),
            timing.connection_ms,
            timing.ttfb_ms,
            timing.total_ms
        );
    }
    if !resp.body.is_empty() {
        println!();
        println!("{}", resp.body_text());
    }
}

fn build_plan(
    target: &Target,
    path: &str,
    method: &str,
    headers: &[String],
    raw_headers: &[String],
    body: &Option<String>,
    line_ending: &str,
) -> Result<RequestPlan> {
    let mut plan = RequestPlan::new()
        .method(method)
        .path(path)
        .host(&target.host)
        .port(target.port)
        .scheme(target.scheme)
        .header("Host", &target.host);

    for header in headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| anyhow!("header must be 'Name: Value': {}", header))?;
        plan = plan.header(name.trim(), value.trim());
    }
    for raw in raw_headers {
        plan = plan.raw_header(raw.as_bytes().to_vec());
    }
    if let Some(body) = body {
        plan = plan
            .header("Content-Length", &body.len().to_string())
            .body(body.clone());
    }

    plan = match line_ending {
        "crlf" => plan.line_ending(LineEnding::Crlf),
        "lf" => plan.line_ending(LineEnding::Lf),
        "cr" => plan.line_ending(LineEnding::Cr),
        other => plan.line_ending(LineEnding::Custom(other.to_string())),
    };
    Ok(plan)
}

async fn run_send(cli: &Cli, args: &SendArgs) -> Result<()> {
    let (target, path) = parse_target(&args.target)?;
    let mut options = send_options(cli)?;
    options.keep_alive = args.keep_alive;

    if let Some(file) = &args.file {
        let bytes = std::fs::read(file)
            .with_context(|| format!("cannot read request file {}", file.display()))?;
        let resp = transport::send_bytes(&target, &bytes, &options)
            .await
            .map_err(|e| anyhow!(e.to_string()))?;
        print_response(&resp);
        return Ok(());
    }

    let plan = build_plan(
        &target,
        &path,
        &args.method,
        &args.headers,
        &args.raw_headers,
        &args.body,
        &args.line_ending,
    )?;

    if let Some(count) = args.pipeline {
        let payloads: Vec<Vec<u8>> = (0..count).map(|_| plan.build()).collect();
        let responses = transport::send_pipelined(&target, &payloads, &options)
            .await
            .map_err(|e| anyhow!(e.to_string()))?;
        for (i, resp) in responses.iter().enumerate() {
            println!("{}", format!("--- response {} ---", i + 1).bold());
            print_response(resp);
        }
        return Ok(());
    }

    let resp = transport::send_plan(&plan, &options)
        .await
        .map_err(|e| anyhow!(e.to_string()))?;
    print_response(&resp);
    Ok(())
}

fn attack_plan(args: &AttackArgs, target: &Target, path: &str) -> Result<Vec<u8>> {
    let host = &target.host;
    let plan = match args.recipe.as_str() {
        "cl-te" => attacks::smuggling_cl_te(host, path, &args.value),
        "te-cl" => attacks::smuggling_te_cl(host, path, &args.value),
        "te-obfuscation" => {
            let kind = args
                .kind
                .as_deref()
                .and_then(attacks::TeObfuscation::from_name)
                .ok_or_else(|| {
                    anyhow!("--kind must be one of space, tab, case, null, vertical-tab, newline")
                })?;
            attacks::obfuscated_transfer_encoding(host, path, kind)
        }
        "crlf" => attacks::crlf_injection(host, &args.name, &args.value),
        "duplicate-headers" => attacks::duplicate_headers(host, &args.name, &args.value, "second"),
        "oversized-header" => attacks::oversized_header(host, &args.name, args.size),
        "null-byte" => attacks::null_byte_injection(host, &args.name, &args.value),
        "method-override" => attacks::method_override(host, path, &args.value),
        "absolute-uri" => attacks::absolute_uri(host, target.port, path),
        "host-header" => {
            let kind = args
                .kind
                .as_deref()
                .and_then(attacks::HostAttack::from_name)
                .ok_or_else(|| {
                    anyhow!("--kind must be one of duplicate, override, absolute-url, port-injection, subdomain")
                })?;
            let attack_host = args
                .attack_host
                .as_deref()
                .ok_or_else(|| anyhow!("--attack-host is required for host-header"))?;
            attacks::host_header_attack(host, attack_host, kind)
        }
        "http09" => return Ok(attacks::http09_request(path)),
        other => bail!("unknown recipe: {}", other),
    };
    Ok(plan.build())
}

fn print_authorization_banner() {
    println!("{}", "=".repeat(72).bright_red());
    println!(
        "{}",
        "rwire attack mode: crafted malformed traffic".bright_red().bold()
    );
    println!("{}", "=".repeat(72).bright_red());
    println!(
        "{}",
        "Only use against systems you are explicitly authorized to test.".bright_yellow()
    );
    println!(
        "started at {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    println!();
}

async fn run_attack(cli: &Cli, args: &AttackArgs) -> Result<()> {
    let (target, path) = parse_target(&args.target)?;
    let payload = attack_plan(args, &target, &path)?;

    if args.dry_run {
        println!("{}", String::from_utf8_lossy(&payload));
        return Ok(());
    }

    print_authorization_banner();
    if !args.authorization_confirmed {
        bail!("refusing to send attack traffic without --i-have-authorization");
    }

    let options = send_options(cli)?;
    let resp = transport::send_bytes(&target, &payload, &options)
        .await
        .map_err(|e| anyhow!(e.to_string()))?;
    print_response(&resp);

    let indicators = resp.smuggling_indicators();
    if indicators.both_present {
        println!(
            "{}",
            "note: response carries both Content-Length and Transfer-Encoding".yellow()
        );
    }
    Ok(())
}

async fn run_h2(cli: &Cli, args: &H2Args) -> Result<()> {
    let (target, path) = parse_target(&args.target)?;
    let options = send_options(cli)?;

    let mut plan = RequestPlan::new()
        .method(&args.method)
        .path(&path)
        .host(&target.host)
        .port(target.port)
        .scheme(Scheme::Https);
    for header in &args.headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| anyhow!("header must be 'Name: Value': {}", header))?;
        plan = plan.header(name.trim(), value.trim());
    }
    if let Some(body) = &args.body {
        plan = plan.body(body.clone());
    }

    let resp = h2::send(&plan, &options)
        .await
        .map_err(|e| anyhow!(e.to_string()))?;

    println!(
        "{} (stream {}, {} frames, {} body bytes)",
        resp.status_code.to_string().bold(),
        resp.stream_id,
        resp.frames.len(),
        resp.body.len()
    );
    for (name, value) in resp.headers.entries() {
        println!("  {}: {}", name.cyan(), value);
    }
    if args.show_frames {
        for frame in &resp.frames {
            println!(
                "  {} stream={} flags={:#04x} len={}",
                frame.type_name().magenta(),
                frame.stream_id,
                frame.flags,
                frame.length
            );
        }
    }
    if !resp.body.is_empty() {
        println!();
        println!("{}", String::from_utf8_lossy(&resp.body));
    }
    Ok(())
}

fn run_diff(args: &DiffArgs) -> Result<()> {
    let a = std::fs::read(&args.file_a)
        .with_context(|| format!("cannot read {}", args.file_a.display()))?;
    let b = std::fs::read(&args.file_b)
        .with_context(|| format!("cannot read {}", args.file_b.display()))?;

    let result = if args.requests {
        diff::diff_requests(&a, &b)
    } else {
        diff::diff_response_bytes(&a, &b)
    };

    println!("{}", diff::summarize(&result));
    for field in &result.fields {
        if field.kind != diff::DiffKind::Unchanged {
            println!(
                "  {}: {:?} -> {:?}",
                field.field.bold(),
                field.old.as_deref().unwrap_or("-"),
                field.new.as_deref().unwrap_or("-")
            );
        }
    }
    for header in &result.headers {
        if header.kind != diff::DiffKind::Unchanged {
            println!(
                "  {}: {:?} -> {:?}",
                header.name.cyan(),
                header.old.as_deref().unwrap_or("-"),
                header.new.as_deref().unwrap_or("-")
            );
        }
    }
    if args.full {
        for line in &result.unified {
            match line.as_bytes().first() {
                Some(b'-') => println!("{}", line.red()),
                Some(b'+') => println!("{}", line.green()),
                _ => println!("{}", line),
            }
        }
    }
    Ok(())
}

fn run_encode(args: &EncodeArgs) -> Result<()> {
    let kind = encoder::Encoding::from_name(&args.kind)
        .ok_or_else(|| anyhow!("unknown encoding: {}", args.kind))?;
    if args.decode {
        let out = encoder::decode(&args.input, kind).map_err(|e| anyhow!(e.to_string()))?;
        println!("{}", out);
    } else {
        println!("{}", encoder::encode(&args.input, kind));
    }
    Ok(())
}

fn run_traversal(args: &TraversalArgs) {
    for variant in encoder::path_traversal_variants(args.depth) {
        println!("{}", variant);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .parse_filters(&cli.log_level)
        .init();
    debug!("rwire starting: {:?}", cli.command);

    match &cli.command {
        Commands::Send(args) => run_send(&cli, args).await,
        Commands::Attack(args) => run_attack(&cli, args).await,
        Commands::H2(args) => run_h2(&cli, args).await,
        Commands::Diff(args) => run_diff(args),
        Commands::Encode(args) => run_encode(args),
        Commands::Traversal(args) => {
            run_traversal(args);
            Ok(())
        }
    }
}
