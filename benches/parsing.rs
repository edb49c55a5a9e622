//! Benchmarks for inbound parsing and outbound rendering.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use slirc_engine::wire::{authenticate_chunks, render, tokenize};
use slirc_engine::{parser, Connection, Outbound};

/// Simple PING message
const SIMPLE_MESSAGE: &str = "PING :irc.example.com";

/// Message with prefix
const PREFIX_MESSAGE: &str = ":nick!user@host PRIVMSG #channel :Hello, world!";

/// Message with IRCv3 tags, which the engine skips
const TAGGED_MESSAGE: &str = "@time=2023-01-01T00:00:00.000Z;msgid=abc123 :nick!user@host PRIVMSG #channel :Hello with tags!";

/// CTCP ACTION
const ACTION_MESSAGE: &str = ":nick!user@host PRIVMSG #channel :\x01ACTION waves at everyone\x01";

/// Numeric response
const NUMERIC_RESPONSE: &str = ":irc.server.net 001 nickname :Welcome to the IRC Network nickname!user@host";

/// Multi-line capability list
const CAP_LS: &str = ":irc.server.net CAP * LS * :account-notify away-notify batch cap-notify chghost echo-message extended-join invite-notify multi-prefix sasl=PLAIN,EXTERNAL,SCRAM-SHA-256 server-time";

const LINES: [(&str, &str); 6] = [
    ("simple_ping", SIMPLE_MESSAGE),
    ("with_prefix", PREFIX_MESSAGE),
    ("with_tags", TAGGED_MESSAGE),
    ("ctcp_action", ACTION_MESSAGE),
    ("numeric_response", NUMERIC_RESPONSE),
    ("cap_ls", CAP_LS),
];

fn connection() -> Connection {
    Connection::new(None, encoding::UTF_8, "nickname")
}

fn benchmark_tokenize(c: &mut Criterion) {
    let mut group = c.benchmark_group("Tokenize");
    for (name, line) in LINES {
        group.bench_with_input(BenchmarkId::from_parameter(name), line, |b, s| {
            b.iter(|| black_box(tokenize(black_box(s))))
        });
    }
    group.finish();
}

fn benchmark_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("Event Parsing");
    let conn = connection();
    for (name, line) in LINES {
        group.bench_with_input(BenchmarkId::from_parameter(name), line, |b, s| {
            b.iter(|| black_box(parser::parse(&conn, black_box(s.as_bytes()))))
        });
    }
    group.finish();
}

fn benchmark_rendering(c: &mut Criterion) {
    let mut group = c.benchmark_group("Rendering");

    let simple = Outbound::Privmsg {
        targets: vec!["#channel".into()],
        message: "Hello, world!".into(),
    };
    let fanout = Outbound::Privmsg {
        targets: (0..50).map(|i| format!("#channel-{}", i)).collect(),
        message: "Hello, everyone!".into(),
    };
    let action = Outbound::Action {
        targets: vec!["#channel".into()],
        text: "waves".into(),
    };

    group.bench_function("privmsg_simple", |b| {
        b.iter(|| black_box(render(black_box(&simple))))
    });
    group.bench_function("privmsg_fanout", |b| {
        b.iter(|| black_box(render(black_box(&fanout))))
    });
    group.bench_function("action", |b| {
        b.iter(|| black_box(render(black_box(&action))))
    });
    group.bench_function("authenticate_chunks", |b| {
        let payload = vec![0x41u8; 1000];
        b.iter(|| black_box(authenticate_chunks(black_box(&payload))))
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_tokenize,
    benchmark_parsing,
    benchmark_rendering,
);

criterion_main!(benches);
