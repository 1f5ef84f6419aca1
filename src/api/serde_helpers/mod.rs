pub mod decimal_from_string;
pub mod field_as_string;
pub mod option_field_as_string;
