//! Performance benchmarks for Lodestar
//!
//! These benchmarks cover the per-event hot paths: key binding lookup,
//! layer placement and building a frame's paint list.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use lodestar::geometry::{Edges, Rectangle, Size};
use lodestar::input::keybinding::{KeyBindings, KeyCombo, Modifiers};
use lodestar::protocol::headless::{HeadlessSeat, HeadlessSession, HeadlessToplevel, SerialCounter};
use lodestar::toolkit::layer::LayerKind;
use lodestar::toolkit::panel::{place_panel, PanelConfig};
use lodestar::toolkit::window::ClientIdentity;
use lodestar::{Config, Server};
use xkbcommon::xkb;

/// Benchmark binding lookup with a table of realistic size
fn bench_key_bindings(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_bindings");

    for count in [10u32, 50, 200] {
        let mut bindings = KeyBindings::new();
        for i in 0..count {
            let keysym = xkb::Keysym::new(xkb::Keysym::a.raw() + i % 26);
            let modifiers = if i % 2 == 0 {
                Modifiers::LOGO
            } else {
                Modifiers::CTRL | Modifiers::ALT
            };
            bindings.bind(KeyCombo::new(modifiers, keysym), i);
        }
        group.bench_function(format!("dispatch_{}_bindings", count), |b| {
            b.iter(|| {
                black_box(bindings.dispatch(
                    black_box(Modifiers::CTRL | Modifiers::ALT),
                    black_box(xkb::Keysym::z),
                    |_| true,
                ))
            })
        });
    }

    group.finish();
}

/// Benchmark exclusive-zone placement around an output
fn bench_panel_placement(c: &mut Criterion) {
    let full = Rectangle::new(0, 0, 2560, 1440);
    let configs: Vec<PanelConfig> = [
        (Edges::TOP | Edges::LEFT | Edges::RIGHT, Size::new(0, 24)),
        (Edges::LEFT | Edges::TOP | Edges::BOTTOM, Size::new(64, 0)),
        (Edges::BOTTOM, Size::new(400, 48)),
        (Edges::RIGHT | Edges::TOP, Size::new(64, 256)),
    ]
    .into_iter()
    .map(|(anchor, size)| PanelConfig {
        anchor,
        size,
        exclusive_zone: size.width.min(size.height).max(1),
        ..PanelConfig::new(LayerKind::Top)
    })
    .collect();

    c.bench_function("place_four_panels", |b| {
        b.iter(|| {
            let mut usable = full;
            for config in &configs {
                black_box(place_panel(config, full, &mut usable));
            }
            usable
        })
    });
}

fn populated_server(windows: usize) -> Server {
    let config: Config = "{}".parse().expect("empty config");
    let mut server = Server::new(
        config,
        Box::new(HeadlessSeat::new()),
        Box::new(HeadlessSession::new()),
    )
    .expect("server");
    server.output_added("HEADLESS-1", Size::new(1920, 1080));
    let serials = SerialCounter::new();
    for _ in 0..windows {
        let handle = HeadlessToplevel::new(&serials);
        let surface = server.allocate_surface();
        let id = server.toplevel_created(surface, Box::new(handle.clone()), ClientIdentity::default());
        server.toplevel_commit(id, None, Size::default()).expect("initial commit");
        let (serial, _) = handle.last_configure().expect("configure");
        server
            .toplevel_commit(id, Some(serial), Size::new(640, 480))
            .expect("commit");
    }
    server
}

/// Benchmark building the paint list with many mapped windows
fn bench_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame");

    for windows in [1usize, 10, 50] {
        group.bench_function(format!("frame_with_{}_windows", windows), |b| {
            b.iter_batched(
                || populated_server(windows),
                |mut server| black_box(server.frame()),
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_key_bindings, bench_panel_placement, bench_frame);
criterion_main!(benches);
