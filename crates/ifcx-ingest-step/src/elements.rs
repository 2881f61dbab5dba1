//! IFC entity types the tabular lift turns into rows.

/// Row-producing types, in the order rows are emitted.
///
/// Matching is on the exact type name; subtypes that are not listed (for
/// example `IFCWALLSTANDARDCASE`) are not picked up.
pub const ELEMENTS: &[&str] = &[
    // Spatial
    "IFCPROJECT",
    "IFCSITE",
    "IFCBUILDING",
    "IFCBUILDINGSTOREY",
    "IFCSPACE",
    "IFCZONE",
    // Building
    "IFCWALL",
    "IFCSLAB",
    "IFCBEAM",
    "IFCCOLUMN",
    "IFCDOOR",
    "IFCWINDOW",
    "IFCSTAIR",
    "IFCSTAIRFLIGHT",
    "IFCRAILING",
    "IFCROOF",
    "IFCCURTAINWALL",
    "IFCMEMBER",
    "IFCPILE",
    "IFCFOOTING",
    "IFCCOVERING",
    "IFCCHIMNEY",
    "IFCPLATE",
    "IFCELEMENTASSEMBLY",
    "IFCBUILDINGELEMENTPART",
    "IFCBUILDINGELEMENTPROXY",
    // Distribution (MEP)
    "IFCFLOWSEGMENT",
    "IFCFLOWFITTING",
    "IFCFLOWTERMINAL",
    "IFCFLOWCONTROLLER",
    "IFCDISTRIBUTIONCHAMBERELEMENT",
    "IFCENERGYCONVERSIONDEVICE",
    "IFCFLOWSTORAGEDEVICE",
    "IFCFLOWMOVINGDEVICE",
    "IFCFLOWTREATMENTDEVICE",
    // Furnishing and equipment
    "IFCFURNISHINGELEMENT",
    "IFCTRANSPORTELEMENT",
    "IFCELECTRICALELEMENT",
    "IFCEQUIPMENTELEMENT",
    // Structural and detailing
    "IFCDISCRETEACCESSORY",
    "IFCMECHANICALFASTENER",
    "IFCREINFORCINGELEMENT",
    "IFCREINFORCINGBAR",
    "IFCREINFORCINGMESH",
    "IFCTENDON",
    "IFCTENDONANCHOR",
    // Civil / infrastructure (IFC4.3)
    "IFCALIGNMENT",
    "IFCALIGNMENTELEMENT",
    "IFCTRACKELEMENT",
    "IFCBRIDGEPART",
    "IFCGEOTECHNICALELEMENT",
    "IFCROAD",
    "IFCCIVILELEMENT",
    // Features and openings
    "IFCOPENINGELEMENT",
    "IFCVOIDINGFEATURE",
    "IFCFEATUREELEMENTADDITION",
    "IFCFEATUREELEMENTSUBTRACTION",
    "IFCPROJECTIONELEMENT",
];

/// Listed types whose attribute 7 is not `Tag` (spatial structure, groups,
/// positioning elements).
const NO_TAG: &[&str] = &[
    "IFCPROJECT",
    "IFCSITE",
    "IFCBUILDING",
    "IFCBUILDINGSTOREY",
    "IFCSPACE",
    "IFCZONE",
    "IFCALIGNMENT",
    "IFCALIGNMENTELEMENT",
    "IFCBRIDGEPART",
    "IFCROAD",
];

/// Attribute index of `Tag` for a row-producing type, if it has one.
pub fn tag_index(type_name: &str) -> Option<usize> {
    if NO_TAG.contains(&type_name) {
        None
    } else {
        Some(7)
    }
}
