pub mod unit;

#[cfg(test)]
pub mod test_support;
