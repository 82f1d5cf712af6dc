/// Greatest common divisor. `gcd(0, b) == b`.
pub fn gcd(a: usize, b: usize) -> usize {
    let (mut a, mut b) = (a, b);
    while b != 0 {
        let rem = a % b;
        a = b;
        b = rem;
    }
    a
}

/// Least common multiple. Returns 0 when either value is 0.
pub fn lcm(a: usize, b: usize) -> usize {
    if a == 0 || b == 0 {
        return 0;
    }
    a / gcd(a, b) * b
}

/// Least common multiple of every value, 1 for an empty iterator.
pub fn lcm_all<I: IntoIterator<Item = usize>>(values: I) -> usize {
    values.into_iter().fold(1, lcm)
}

/// Smallest multiple of `align` that is greater or equal to `value`.
pub fn integer_least_multiple(value: usize, align: usize) -> usize {
    if align == 0 {
        return value;
    }
    value.div_ceil(align) * align
}

/// Whether `value` is a multiple of `divisor`, with 0 never dividing anything.
pub fn is_multiple_of(value: usize, divisor: usize) -> bool {
    divisor != 0 && value % divisor == 0
}
