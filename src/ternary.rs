/// Conditional expression.  Rust's `if` is already an expression, but
/// `cargo fmt` spreads it across five lines, and the edge tables in
/// the gradient and min-path code read better one case per line.
#[macro_export]
macro_rules! cq {
    ($condition: expr, $_true: expr, $_false: expr) => {
        if $condition {
            $_true
        } else {
            $_false
        }
    };
}
