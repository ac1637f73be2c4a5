pub const NEC_CARRIER_KHZ: u32 = 38;
pub const NEC_DUTY_PERCENT: u8 = 33;

pub const HEADER_MARK_US: u16 = 9_000;
pub const HEADER_SPACE_US: u16 = 4_500;
pub const BIT_MARK_US: u16 = 560;
pub const ONE_SPACE_US: u16 = 1_690;
pub const ZERO_SPACE_US: u16 = 560;

pub const FRAME_BITS: u32 = 32;
pub const FRAME_TIMINGS: usize = 2 + 2 * FRAME_BITS as usize + 1;

// Alternating mark/space durations in microseconds, starting with a mark.
pub fn frame_timings(code: u32) -> Vec<u16> {
    let mut timings = Vec::with_capacity(FRAME_TIMINGS);
    timings.push(HEADER_MARK_US);
    timings.push(HEADER_SPACE_US);

    for bit in (0..FRAME_BITS).rev() {
        timings.push(BIT_MARK_US);
        timings.push(if code & (1 << bit) != 0 {
            ONE_SPACE_US
        } else {
            ZERO_SPACE_US
        });
    }

    timings.push(BIT_MARK_US);
    timings
}
