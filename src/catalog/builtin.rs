use super::{Category, ModuleDescriptor};

const PREFIX: &str = "biolockj.module";

/// Exclusion group shared by every classifier: a pipeline runs exactly one.
pub const CLASSIFIER_GROUP: &str = "classifier";

const R_PARAMS: &[(&str, &str)] = &[
    ("r.colorBase", "Please choose your R plot base color."),
    ("r.colorHighlight", "Please choose your R plot highlight color."),
    ("r.colorPalette", "Please choose your R plot color palette."),
    ("r.colorPoint", "Please choose your R plot point color."),
    ("r.pch", "Please choose your R point size."),
    ("r.plotWidth", "Please choose your R plot width (positive integer)."),
    ("r.pvalCutoff", "Please choose your p-value cut off (alpha) for your R statistics."),
    ("r.pValFormat", "Please choose your p-value format for your R reports."),
    ("r.rareOtuThreshold", "Please choose your rare OTU threshold (positive integer)."),
    ("r.timeout", "Please set your R timeout threshold (positive integer)."),
    ("r_CalculateStats.pAdjustMethod", "Please choose your p-value adjust method."),
    ("r_CalculateStats.pAdjustScope", "Please choose your p-value adjust scope."),
];

const EMAIL_PARAMS: &[(&str, &str)] = &[
    (
        "mail.encryptedPassword",
        "In order to receive an emailed report, please provide your encrypted password.",
    ),
    ("mail.from", "Please choose the email address the report is sent from."),
    ("mail.smtp.auth", "Please provide SMTP authentication."),
    ("mail.smtp.host", "Please provide your SMTP host."),
    ("mail.to", "Please provide the email recipient."),
    ("mail.smtp.port", "Please provide the SMTP port."),
];

fn module(path: &str, category: Category) -> ModuleDescriptor {
    ModuleDescriptor::new(format!("{PREFIX}.{path}"), category)
}

fn classifier(path: &str) -> ModuleDescriptor {
    module(path, Category::Classifier).exclusive_in(CLASSIFIER_GROUP)
}

pub(super) fn modules() -> Vec<ModuleDescriptor> {
    vec![
        module("implicit.ImportMetadata", Category::Implicit),
        module("implicit.Demultiplexer", Category::Implicit),
        module("implicit.RegisterNumReads", Category::Implicit),
        module("seq.SeqFileValidator", Category::Seq),
        module("seq.TrimPrimers", Category::Seq),
        module("seq.Rarefier", Category::Seq).requires_any(
            &["rarefier.max", "rarefier.min"],
            "A maximum or minimum value is required for the rarefier.",
        ),
        module("seq.AwkFastaConverter", Category::Seq),
        module("seq.Multiplexer", Category::Seq),
        module("seq.PearMergeReads", Category::Seq),
        module("seq.Gunzipper", Category::Seq),
        classifier("classifier.r16s.QiimeClosedRefClassifier"),
        classifier("classifier.r16s.RdpClassifier").requires(
            "rdp.minThresholdScore",
            "Please provide the RDP minimum threshold score.",
        ),
        classifier("classifier.r16s.QiimeDeNovoClassifier"),
        classifier("classifier.r16s.QiimeOpenRefClassifier"),
        classifier("classifier.wgs.KrakenClassifier")
            .requires("kraken.db", "Please provide a Kraken database."),
        classifier("classifier.wgs.MetaphlanClassifier"),
        classifier("classifier.wgs.SlimmClassifier"),
        module("implicit.parser.r16s.RdpParser", Category::ImplicitParser),
        module("implicit.parser.r16s.QiimeParser", Category::ImplicitParser),
        module("implicit.parser.wgs.KrakenParser", Category::ImplicitParser),
        module("implicit.parser.wgs.MetaphlanParser", Category::ImplicitParser),
        module("implicit.parser.wgs.SlimmParser", Category::ImplicitParser),
        module("implicit.qiime.BuildQiimeMapping", Category::Qiime),
        module("implicit.qiime.MergeQiimeOtuTables", Category::Qiime),
        module("implicit.qiime.QiimeClassifier", Category::Qiime),
        module("report.Normalizer", Category::Report),
        module("report.AddMetadataToOtuTables", Category::Report),
        module("report.JsonReport", Category::Report),
        module("report.Email", Category::Report).requires_all(EMAIL_PARAMS),
        module("r.BuildMdsPlots", Category::R).requires_all(R_PARAMS),
        module("r.BuildOtuPlots", Category::R).requires_all(R_PARAMS),
        module("r.BuildPvalHistograms", Category::R).requires_all(R_PARAMS),
        module("r.CalculateStats", Category::R).requires_all(R_PARAMS),
    ]
}
