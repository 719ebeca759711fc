// Copyright (c) 2025 Felix Kahle.
//
// Permission is hereby granted, free of charge, to any person obtaining
// a copy of this software and associated documentation files (the
// "Software"), to deal in the Software without restriction, including
// without limitation the rights to use, copy, modify, merge, publish,
// distribute, sublicense, and/or sell copies of the Software, and to
// permit persons to whom the Software is furnished to do so, subject to
// the following conditions:
//
// The above copyright notice and this permission notice shall be
// included in all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND,
// EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF
// MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE
// LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION
// OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION
// WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! The metric contract: the element type of a discrete, totally ordered,
//! finite domain. Primitive integers implement it out of the box; address
//! domains are covered by the [`V4Addr`] and [`V6Addr`] newtypes.

use num_traits::Bounded;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// A discrete, totally ordered, finite value domain.
///
/// The extrema of the domain come from [`num_traits::Bounded`]. The two
/// stepping methods take the place of the pre-increment / pre-decrement a
/// discrete domain is expected to support.
///
/// # Contract
///
/// [`advance`] must yield a strictly larger value and must only be called
/// when `self < Self::max_value()`; [`retreat`] is the exact dual. Callers
/// are expected to establish the precondition with an ordering test before
/// stepping, so that domains with modular representations never wrap
/// through an extremum.
///
/// [`advance`]: Metric::advance
/// [`retreat`]: Metric::retreat
pub trait Metric: Copy + Ord + Bounded {
    /// The next discrete value. Only valid when `self < Self::max_value()`.
    fn advance(self) -> Self;

    /// The previous discrete value. Only valid when `self > Self::min_value()`.
    fn retreat(self) -> Self;
}

macro_rules! impl_metric_for_int {
    ($($t:ty),* $(,)?) => {$(
        impl Metric for $t {
            #[inline]
            fn advance(self) -> Self {
                self + 1
            }

            #[inline]
            fn retreat(self) -> Self {
                self - 1
            }
        }
    )*};
}

impl_metric_for_int!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

/// An IPv4 address as a metric.
///
/// [`std::net::Ipv4Addr`] already orders numerically; the newtype exists so
/// the extrema and stepping operations can be supplied without running into
/// the orphan rule.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct V4Addr(Ipv4Addr);

impl V4Addr {
    #[inline]
    pub const fn new(addr: Ipv4Addr) -> Self {
        V4Addr(addr)
    }

    #[inline]
    pub const fn value(self) -> Ipv4Addr {
        self.0
    }
}

impl fmt::Display for V4Addr {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Ipv4Addr> for V4Addr {
    #[inline]
    fn from(addr: Ipv4Addr) -> Self {
        V4Addr(addr)
    }
}

impl From<V4Addr> for Ipv4Addr {
    #[inline]
    fn from(addr: V4Addr) -> Self {
        addr.0
    }
}

impl From<[u8; 4]> for V4Addr {
    #[inline]
    fn from(octets: [u8; 4]) -> Self {
        V4Addr(Ipv4Addr::from(octets))
    }
}

impl Bounded for V4Addr {
    #[inline]
    fn min_value() -> Self {
        V4Addr(Ipv4Addr::new(0, 0, 0, 0))
    }

    #[inline]
    fn max_value() -> Self {
        V4Addr(Ipv4Addr::new(255, 255, 255, 255))
    }
}

impl Metric for V4Addr {
    #[inline]
    fn advance(self) -> Self {
        V4Addr(Ipv4Addr::from(u32::from(self.0) + 1))
    }

    #[inline]
    fn retreat(self) -> Self {
        V4Addr(Ipv4Addr::from(u32::from(self.0) - 1))
    }
}

/// An IPv6 address as a metric. See [`V4Addr`].
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct V6Addr(Ipv6Addr);

impl V6Addr {
    #[inline]
    pub const fn new(addr: Ipv6Addr) -> Self {
        V6Addr(addr)
    }

    #[inline]
    pub const fn value(self) -> Ipv6Addr {
        self.0
    }
}

impl fmt::Display for V6Addr {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Ipv6Addr> for V6Addr {
    #[inline]
    fn from(addr: Ipv6Addr) -> Self {
        V6Addr(addr)
    }
}

impl From<V6Addr> for Ipv6Addr {
    #[inline]
    fn from(addr: V6Addr) -> Self {
        addr.0
    }
}

impl Bounded for V6Addr {
    #[inline]
    fn min_value() -> Self {
        V6Addr(Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 0))
    }

    #[inline]
    fn max_value() -> Self {
        V6Addr(Ipv6Addr::new(
            0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff,
        ))
    }
}

impl Metric for V6Addr {
    #[inline]
    fn advance(self) -> Self {
        V6Addr(Ipv6Addr::from(u128::from(self.0) + 1))
    }

    #[inline]
    fn retreat(self) -> Self {
        V6Addr(Ipv6Addr::from(u128::from(self.0) - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_advance_and_retreat() {
        assert_eq!(5u8.advance(), 6);
        assert_eq!(5u8.retreat(), 4);
        assert_eq!((-1i32).advance(), 0);
        assert_eq!(0i32.retreat(), -1);
    }

    #[test]
    fn integer_extrema_via_bounded() {
        assert_eq!(<u8 as Bounded>::min_value(), 0);
        assert_eq!(<u8 as Bounded>::max_value(), 255);
        assert_eq!(<i16 as Bounded>::min_value(), i16::MIN);
    }

    #[test]
    fn advance_at_the_edge_of_the_penultimate_value() {
        assert_eq!(254u8.advance(), 255);
        assert_eq!(1u8.retreat(), 0);
    }

    #[test]
    fn v4_orders_numerically() {
        let a = V4Addr::from([10, 0, 0, 1]);
        let b = V4Addr::from([10, 0, 1, 0]);
        assert!(a < b);
    }

    #[test]
    fn v4_advance_carries_across_octets() {
        let a = V4Addr::from([10, 0, 0, 255]);
        assert_eq!(a.advance(), V4Addr::from([10, 0, 1, 0]));
        assert_eq!(a.advance().retreat(), a);
    }

    #[test]
    fn v4_extrema() {
        assert_eq!(V4Addr::min_value(), V4Addr::from([0, 0, 0, 0]));
        assert_eq!(V4Addr::max_value(), V4Addr::from([255, 255, 255, 255]));
        assert_eq!(V4Addr::max_value().retreat(), V4Addr::from([255, 255, 255, 254]));
    }

    #[test]
    fn v4_display_roundtrip() {
        let a = V4Addr::from([192, 168, 0, 1]);
        assert_eq!(format!("{}", a), "192.168.0.1");
        assert_eq!(Ipv4Addr::from(a), Ipv4Addr::new(192, 168, 0, 1));
    }

    #[test]
    fn v6_advance_carries_across_segments() {
        let a = V6Addr::new(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0xffff));
        assert_eq!(
            a.advance(),
            V6Addr::new(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 1, 0))
        );
    }

    #[test]
    fn v6_extrema() {
        assert_eq!(u128::from(V6Addr::min_value().value()), 0);
        assert_eq!(u128::from(V6Addr::max_value().value()), u128::MAX);
    }
}
