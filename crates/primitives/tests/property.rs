use stakd_primitives::block::Block;
use stakd_primitives::coins::UnspentOutputs;
use stakd_primitives::encoding::decode;
use stakd_primitives::script::{instructions, legacy_sigops};
use stakd_primitives::transaction::Transaction;

struct Lcg {
    state: u64,
}

impl Lcg {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state
    }

    fn bytes(&mut self, max_len: usize) -> Vec<u8> {
        let len = (self.next_u64() % (max_len as u64 + 1)) as usize;
        (0..len).map(|_| (self.next_u64() >> 33) as u8).collect()
    }
}

#[test]
fn decoders_reject_garbage_without_panicking() {
    let mut rng = Lcg::new(0x5eed);
    for _ in 0..2_000 {
        let bytes = rng.bytes(256);
        let _ = decode::<Transaction>(&bytes);
        let _ = decode::<UnspentOutputs>(&bytes);
        let _ = Block::consensus_decode(&bytes);
    }
}

#[test]
fn script_walk_is_total() {
    let mut rng = Lcg::new(42);
    for _ in 0..2_000 {
        let script = rng.bytes(128);
        let errors = instructions(&script).filter(Result::is_err).count();
        assert!(errors <= 1);
        assert!(legacy_sigops(&script) <= 20 * script.len() as u32);
    }
}
