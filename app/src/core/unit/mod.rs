mod degree_celsius;
mod degree_fahrenheit;

pub use degree_celsius::DegreeCelsius;
pub use degree_fahrenheit::DegreeFahrenheit;

impl From<DegreeCelsius> for DegreeFahrenheit {
    fn from(value: DegreeCelsius) -> Self {
        DegreeFahrenheit(value.0 * 9.0 / 5.0 + 32.0)
    }
}

impl From<DegreeFahrenheit> for DegreeCelsius {
    fn from(value: DegreeFahrenheit) -> Self {
        DegreeCelsius((value.0 - 32.0) * 5.0 / 9.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_celsius_to_fahrenheit() {
        assert_eq!(DegreeFahrenheit::from(DegreeCelsius(10.0)), DegreeFahrenheit(50.0));
        assert_eq!(DegreeFahrenheit::from(DegreeCelsius(-40.0)), DegreeFahrenheit(-40.0));
        assert_eq!(DegreeFahrenheit::from(DegreeCelsius(100.0)), DegreeFahrenheit(212.0));
    }

    #[test]
    fn test_fahrenheit_to_celsius() {
        assert_eq!(DegreeCelsius::from(DegreeFahrenheit(50.0)), DegreeCelsius(10.0));
        assert!(DegreeCelsius::from(DegreeFahrenheit(70.0)).abs_diff(&DegreeCelsius(21.11)) < 0.01);
    }
}
