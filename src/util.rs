// Copyright (c) 2019 Georg Brandl.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.


/// Formats a number with at most `figures` decimal places, dropping trailing
/// zeros (and the point itself for whole numbers).
pub fn fmt_num(v: f64, figures: usize) -> String {
    if !v.is_finite() {
        return format!("{}", v);
    }
    let mut s = format!("{:.*}", figures, v);
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    if s == "-0" {
        s = "0".into();
    }
    s
}

#[cfg(test)]
mod tests {
    use super::fmt_num;

    #[test]
    fn test_fmt_num() {
        assert_eq!(fmt_num(10.0, 4), "10");
        assert_eq!(fmt_num(-2.5, 4), "-2.5");
        assert_eq!(fmt_num(0.47244, 6), "0.47244");
        assert_eq!(fmt_num(1.0 / 3.0, 4), "0.3333");
        assert_eq!(fmt_num(-0.00001, 4), "0");
        assert_eq!(fmt_num(400.0, 6), "400");
    }
}
