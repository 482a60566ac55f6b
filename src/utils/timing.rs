//! Timing arithmetic for the constant-bitrate padding schedule.
//!
//! Access units carry a cyclic 16-bit frame-time field. The byte distance
//! the link owes between two consecutive units is the wrapped frame-time
//! delta scaled by the rate class; whatever the previous unit's finalized
//! size did not cover must be written as zero padding.

/// Audio samples carried by one access unit for the given rate class.
pub fn samples_per_unit(rate_class: u8) -> usize {
    40 << (rate_class & 7)
}

/// Link bytes per frame-time tick for the given rate class.
pub fn spacing_per_tick(rate_class: u8) -> usize {
    64 >> (rate_class & 7)
}

/// Zero-padding bytes owed after a unit of finalized size `prev_size`,
/// given the wrapped frame-time delta to the following unit.
///
/// The delta must stay in 16-bit wraparound arithmetic; widening it to a
/// signed type would mistranslate timestamp wraps into huge gaps. When the
/// spacing falls short of `prev_size` (oversized unit, marker inflation),
/// it is clamped up to the next tick boundary so the result never
/// underflows.
pub fn padding_for_gap(delta: u16, rate_class: u8, prev_size: usize) -> usize {
    let tick = spacing_per_tick(rate_class);
    let mut spacing = delta as usize * tick;

    if spacing < prev_size {
        spacing = prev_size.div_ceil(tick) * tick;
    }

    spacing - prev_size
}

#[test]
fn nominal_spacing() {
    // rate class 0: 48 kHz, 40 samples per unit, 64 bytes per tick
    assert_eq!(samples_per_unit(0), 40);
    assert_eq!(spacing_per_tick(0), 64);
    assert_eq!(padding_for_gap(40, 0, 2500), 60);
    assert_eq!(padding_for_gap(40, 0, 2560), 0);

    // rate class 2: 192 kHz, 160 samples per unit, 16 bytes per tick
    assert_eq!(samples_per_unit(2), 160);
    assert_eq!(padding_for_gap(160, 2, 2500), 60);
}

#[test]
fn wrapped_delta() {
    let delta = 0x0010u16.wrapping_sub(0xFFF0);
    assert_eq!(delta, 0x20);
    assert_eq!(padding_for_gap(delta, 0, 2000), 0x20 * 64 - 2000);
}

#[test]
fn clamped_to_tick_boundary() {
    // spacing 2560 < prev_size 2572: round prev_size up to the 64-byte grid
    assert_eq!(padding_for_gap(40, 0, 2572), 2624 - 2572);
    // already on the grid: no padding at all
    assert_eq!(padding_for_gap(40, 0, 2624), 0);
}

#[test]
fn no_drift_invariant() {
    for (delta, prev) in [(40u16, 2500usize), (80, 5100), (40, 2512), (1000, 64)] {
        let padding = padding_for_gap(delta, 0, prev);
        let spacing = delta as usize * 64;
        if spacing >= prev {
            assert_eq!(spacing, prev + padding);
        }
    }
}
