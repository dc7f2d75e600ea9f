/**
 * UserKNN
 * Copyright (C) 2018 Sebastian Schelter
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

use std::time::Duration;

pub fn to_millis(duration: Duration) -> u64 {
    (duration.as_secs() * 1_000) + (duration.subsec_nanos() / 1_000_000) as u64
}

/// Arithmetic mean, 0 for an empty sequence.
pub fn mean<I>(values: I) -> f64 where I: IntoIterator<Item=f64> {
    let (sum, count) = values.into_iter()
        .fold((0.0, 0_usize), |(sum, count), value| (sum + value, count + 1));

    if count == 0 { 0.0 } else { sum / count as f64 }
}


#[cfg(test)]
mod tests {

    use std::time::Duration;
    use crate::utils;

    #[test]
    fn millis() {
        assert_eq!(utils::to_millis(Duration::new(2, 345_678_901)), 2_345);
    }

    #[test]
    fn mean_of_nothing_is_zero() {
        assert_eq!(utils::mean(Vec::new()), 0.0);
        assert_eq!(utils::mean(vec![1.0, 2.0, 4.5]), 2.5);
    }
}
