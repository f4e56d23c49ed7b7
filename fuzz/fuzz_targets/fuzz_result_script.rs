#![no_main]

use arbitrary::Arbitrary;
use deferral_harness::{Op, check};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug, Clone, Copy)]
enum FuzzOp {
    Resolve(i8),
    Reject(i8),
    Notify(i8),
    Done,
    Fail,
    Progress,
    Always,
}

impl From<FuzzOp> for Op {
    fn from(op: FuzzOp) -> Self {
        match op {
            FuzzOp::Resolve(v) => Op::Resolve(i64::from(v)),
            FuzzOp::Reject(v) => Op::Reject(i64::from(v)),
            FuzzOp::Notify(v) => Op::Notify(i64::from(v)),
            FuzzOp::Done => Op::Done,
            FuzzOp::Fail => Op::Fail,
            FuzzOp::Progress => Op::Progress,
            FuzzOp::Always => Op::Always,
        }
    }
}

fuzz_target!(|ops: Vec<FuzzOp>| {
    let ops: Vec<Op> = ops.into_iter().take(512).map(Op::from).collect();
    if let Err(violation) = check(&ops) {
        panic!("{violation}: {ops:?}");
    }
});
