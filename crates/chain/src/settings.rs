//! Organization policy and runtime settings.

/// Policy knobs consumed by the organizers and the facade.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Relay fee per serialized byte, in satoshis.
    pub byte_fee_satoshis: f32,
    /// Relay fee per signature operation, in satoshis.
    pub sigop_fee_satoshis: f32,
    /// Outputs below this value are rejected as dust.
    pub minimum_output_satoshis: u64,
    /// Prove work over scrypt instead of double-SHA256.
    pub scrypt: bool,
    /// Threads in the priority validation pool (0 = one per core).
    pub priority_threads: usize,
    /// Threads in the general dispatch pool (0 = one per core).
    pub dispatch_threads: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            byte_fee_satoshis: 1.0,
            sigop_fee_satoshis: 100.0,
            minimum_output_satoshis: 546,
            scrypt: false,
            priority_threads: 0,
            dispatch_threads: 2,
        }
    }
}
