use crate::catalog::models::Currency;

struct CurrencyFormat {
    code: &'static str,
    symbol: &'static str,
    decimal: &'static str,
    thousands: &'static str,
}

const KNOWN: &[CurrencyFormat] = &[
    CurrencyFormat {
        code: "ARS",
        symbol: "$",
        decimal: ",",
        thousands: ".",
    },
    CurrencyFormat {
        code: "BRL",
        symbol: "R$",
        decimal: ",",
        thousands: ".",
    },
    CurrencyFormat {
        code: "CLP",
        symbol: "$",
        decimal: ",",
        thousands: ".",
    },
    CurrencyFormat {
        code: "COP",
        symbol: "$",
        decimal: ",",
        thousands: ".",
    },
    CurrencyFormat {
        code: "MXN",
        symbol: "$",
        decimal: ".",
        thousands: ",",
    },
    CurrencyFormat {
        code: "PEN",
        symbol: "S/",
        decimal: ".",
        thousands: ",",
    },
    CurrencyFormat {
        code: "UYU",
        symbol: "$U",
        decimal: ",",
        thousands: ".",
    },
    CurrencyFormat {
        code: "USD",
        symbol: "US$",
        decimal: ".",
        thousands: ",",
    },
];

/// Display format for a marketplace currency code. Unknown codes map to
/// themselves with `.` decimals and `,` thousands.
pub fn resolve(code: &str) -> Currency {
    let code = code.trim();
    match KNOWN.iter().find(|known| known.code == code) {
        Some(known) => Currency {
            id: known.code.to_string(),
            symbol: known.symbol.to_string(),
            decimal_divider: known.decimal.to_string(),
            thousands_divider: known.thousands.to_string(),
        },
        None => Currency {
            id: code.to_string(),
            symbol: code.to_string(),
            decimal_divider: ".".to_string(),
            thousands_divider: ",".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ars_uses_comma_decimals() {
        let ars = resolve("ARS");
        assert_eq!(ars.symbol, "$");
        assert_eq!(ars.decimal_divider, ",");
        assert_eq!(ars.thousands_divider, ".");
    }

    #[test]
    fn unknown_code_falls_back_to_identity() {
        assert_eq!(
            resolve("XAU"),
            Currency {
                id: "XAU".into(),
                symbol: "XAU".into(),
                decimal_divider: ".".into(),
                thousands_divider: ",".into(),
            }
        );
    }
}
