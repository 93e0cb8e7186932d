pub mod defective_lines;
pub mod flat_field;
