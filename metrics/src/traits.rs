/// Conversion into a prometheus label value.
///
/// Implemented for the pipeline's enums next to their definitions, so metric
/// call sites stay free of ad-hoc string formatting.
pub trait ToLabel {
    fn to_label(&self) -> &'static str;
}

impl ToLabel for &'static str {
    fn to_label(&self) -> &'static str {
        self
    }
}
