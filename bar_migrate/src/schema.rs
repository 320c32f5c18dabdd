//! Diesel table definitions.
//!
//! `dbbardata` is created by the embedded migrations. `daily_data` belongs to the
//! ingestion side and is only ever read.

diesel::table! {
    dbbardata (id) {
        id -> Integer,
        symbol -> Text,
        exchange -> Text,
        datetime -> Text,
        interval -> Text,
        volume -> Double,
        turnover -> Nullable<Double>,
        open_interest -> Double,
        open_price -> Double,
        high_price -> Double,
        low_price -> Double,
        close_price -> Double,
        gateway_name -> Text,
        extra -> Nullable<Text>,
    }
}

diesel::table! {
    daily_data (symbol, date) {
        symbol -> Text,
        date -> Text,
        open -> Nullable<Double>,
        high -> Nullable<Double>,
        low -> Nullable<Double>,
        close -> Nullable<Double>,
        volume -> Nullable<Double>,
        amount -> Nullable<Double>,
        turnover_rate -> Nullable<Double>,
    }
}
