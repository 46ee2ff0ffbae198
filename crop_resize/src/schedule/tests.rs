use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;

const COUNTS: OpCounts = OpCounts {
    adds: 6,
    muls: 3,
    casts: 4,
    cell_adds: 5,
};

#[test]
fn test_cell_cost_skips_casts_for_f32() {
    assert_eq!(COUNTS.cell_cost(2, true), 2.0 * 13.0 + 5.0);
    assert_eq!(COUNTS.cell_cost(2, false), 2.0 * 9.0 + 5.0);
    assert_eq!(COUNTS.box_cost(10, 1, true), 180.0);
}

#[test]
fn test_serial_scheduler_uses_one_block() {
    let scheduler = WorkScheduler::serial();
    assert_eq!(scheduler.block_size(17, 1e9), 17);
    assert_eq!(scheduler.partition(17, 1e9), vec![0..17]);
}

#[test]
fn test_cheap_work_is_not_split() {
    let scheduler = WorkScheduler::new(8, 10_000.0);
    // 10 boxes * 100 = 1000 < 10_000
    assert_eq!(scheduler.partition(10, 100.0), vec![0..10]);
}

#[test]
fn test_shards_are_capped_by_parallelism() {
    let scheduler = WorkScheduler::new(4, 10.0);
    let ranges = scheduler.partition(10, 1_000.0);
    assert_eq!(ranges, vec![0..3, 3..6, 6..9, 9..10]);
}

#[test]
fn test_shards_follow_cost() {
    let scheduler = WorkScheduler::new(64, 100.0);
    // total 1000 -> 10 shards of 10 boxes
    let ranges = scheduler.partition(100, 10.0);
    assert_eq!(ranges.len(), 10);
    assert!(ranges.iter().all(|r| r.len() == 10));
}

#[test]
fn test_partition_covers_all_items_contiguously() {
    for (parallelism, n, cost) in [(3, 7, 1e6), (16, 1000, 37.0), (5, 1, 1e9), (2, 0, 1.0)] {
        let ranges = WorkScheduler::new(parallelism, 50.0).partition(n, cost);
        let mut next = 0;
        for r in &ranges {
            assert_eq!(r.start, next);
            assert!(!r.is_empty());
            next = r.end;
        }
        assert_eq!(next, n);
    }
}

#[test]
fn test_for_each_box_mut_visits_every_item_once() {
    let scheduler = WorkScheduler::new(8, 1.0);
    let mut out = vec![0usize; 3 * 50];
    scheduler.for_each_box_mut(&mut out, 3, 100.0, |b, item| {
        for v in item.iter_mut() {
            *v += b + 1;
        }
    });
    for (b, item) in out.chunks(3).enumerate() {
        assert!(item.iter().all(|&v| v == b + 1));
    }
}

#[test]
fn test_for_each_box_mut_ignores_empty_items() {
    let scheduler = WorkScheduler::default();
    let calls = AtomicUsize::new(0);
    let mut out: Vec<f32> = Vec::new();
    scheduler.for_each_box_mut(&mut out, 0, 1.0, |_, _| {
        calls.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_group_by_destination_keeps_box_order_and_drops_invalid() {
    let groups = group_by_destination(&[1, 0, 1, -1, 3, 1], 2);
    assert_eq!(groups, vec![vec![1], vec![0, 2, 5]]);
}

#[test]
fn test_for_each_destination_matches_serial() {
    let groups = group_by_destination(&[0, 2, 2, 1, 0, 2], 4);
    let run = |scheduler: &WorkScheduler| {
        let mut out = vec![0u64; 4 * 2];
        scheduler.for_each_destination_mut(&mut out, 2, &groups, 1e6, |boxes, item| {
            for &b in boxes {
                item[0] = item[0] * 10 + b as u64 + 1;
                item[1] += 1;
            }
        });
        out
    };
    let serial = run(&WorkScheduler::serial());
    let parallel = run(&WorkScheduler::new(8, 1.0));
    assert_eq!(serial, parallel);
    assert_eq!(serial, vec![15, 2, 4, 1, 236, 3, 0, 0]);
}
