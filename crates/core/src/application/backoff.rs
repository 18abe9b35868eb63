// Default exponential-backoff-with-jitter formula.
// A worker-suppliable override always wins over the formula, so a worker
// that wants a flatter curve can pass its own `max_power` or delay outright.

use std::time::Duration;

use rand::Rng;

/// `delay_seconds = 15 + 2^min(attempt, max_power)`, jittered by `±10%`.
/// `max_power` defaults to 10; a lower value flattens the curve for workers
/// that want to retry sooner under sustained load.
pub fn default_backoff(attempt: i32, max_power: u32) -> Duration {
    let power = (attempt.max(0) as u32).min(max_power);
    let base_seconds = 15.0 + 2f64.powi(power as i32);
    let jitter = rand::thread_rng().gen_range(-0.1..=0.1);
    let seconds = base_seconds * (1.0 + jitter);
    Duration::from_secs_f64(seconds.max(0.0))
}

/// The formula used when a worker does not supply its own `backoff(job)`.
pub fn standard_backoff(attempt: i32) -> Duration {
    default_backoff(attempt, 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_one_lies_in_spec_range() {
        for _ in 0..200 {
            let d = standard_backoff(1).as_secs_f64();
            assert!((15.3..=18.7).contains(&d), "{d} out of range");
        }
    }

    #[test]
    fn attempt_five_lies_in_spec_range() {
        for _ in 0..200 {
            let d = standard_backoff(5).as_secs_f64();
            assert!((42.3..=51.7).contains(&d), "{d} out of range");
        }
    }

    #[test]
    fn max_power_caps_the_exponent() {
        // With maxPower=2, attempt >= 2 is based on 2^2 = 4 regardless of
        // how much larger attempt grows.
        for attempt in [2, 3, 7, 15] {
            let d = default_backoff(attempt, 2).as_secs_f64();
            let base = 15.0 + 4.0;
            assert!((base * 0.9..=base * 1.1).contains(&d), "{d} out of range for attempt {attempt}");
        }
    }
}
