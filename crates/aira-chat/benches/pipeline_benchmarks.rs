//! Benchmarks for the per-turn text processing on the hot path.
//!
//! Directive extraction and stripping run over every assistant reply, and
//! the context limiter runs over the whole conversation on every turn.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use aira_chat::context::ContextLimiter;
use aira_chat::parser::{extract_actions, strip_directives};
use aira_core::types::Utterance;

/// A reply of roughly 1 KB carrying every directive kind.
fn reply_with_directives() -> String {
    format!(
        "Đã ghi nhận! Mình đã thêm lịch họp gia đình vào tối mai lúc 19:00 và \
         cập nhật món ăn yêu thích của Minh. {filler}\n\n\
         ##ADD_FAMILY_MEMBER:{{\"name\":\"Bà\",\"age\":\"70\",\"preferences\":{{\"food\":\"chè\"}}}}##\n\
         ##UPDATE_PREFERENCE:{{\"id\":\"3\",\"key\":\"food\",\"value\":\"phở\"}}##\n\
         ##ADD_EVENT:{{\"title\":\"Họp gia đình\",\"date\":\"ngày mai\",\"time\":\"19:00\",\"participants\":[\"Bố\",\"Mẹ\"]}}##\n\
         ##UPDATE_EVENT:{{\"id\":\"7\",\"time\":\"20:00\"}}##\n\
         ##DELETE_EVENT:12##\n\
         ##ADD_NOTE:{{\"title\":\"Mua sắm\",\"content\":\"Sữa, trứng\",\"tags\":[\"chợ\"]}}##",
        filler = "Chúc cả nhà một buổi tối vui vẻ. ".repeat(10)
    )
}

fn conversation(turns: usize) -> Vec<Utterance> {
    (0..turns)
        .flat_map(|i| {
            [
                Utterance::user_text(format!("Câu hỏi số {} về lịch sinh hoạt của gia đình.", i)),
                Utterance::assistant_text("Đây là câu trả lời khá dài. ".repeat(20)),
            ]
        })
        .collect()
}

fn bench_extract_actions(c: &mut Criterion) {
    let reply = reply_with_directives();
    c.bench_function("extract_actions_all_kinds", |b| {
        b.iter(|| extract_actions(black_box(&reply)))
    });
    c.bench_function("strip_directives_all_kinds", |b| {
        b.iter(|| strip_directives(black_box(&reply)))
    });

    let plain = "Không có lệnh nào trong câu trả lời này. ".repeat(25);
    c.bench_function("extract_actions_plain_text", |b| {
        b.iter(|| extract_actions(black_box(&plain)))
    });
}

fn bench_context_limit(c: &mut Criterion) {
    let limiter = ContextLimiter::default();
    let system = "s".repeat(12_000);
    let mut group = c.benchmark_group("context_limit");
    for turns in [10, 100] {
        let mut history = conversation(turns);
        history.push(Utterance::user_text("Tối nay ăn gì?"));
        group.bench_function(format!("{}_turns", turns), |b| {
            b.iter(|| limiter.limit(black_box(&system), black_box(&history)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_extract_actions, bench_context_limit);
criterion_main!(benches);
