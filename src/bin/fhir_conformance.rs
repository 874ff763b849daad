use clap::{Arg, ArgAction, ArgMatches, Command};
use octofhir_conformance::{
    AssessmentOptions, FhirResourceValidator, IgPackage, MessageType, MustSupportAssessment,
    RunContext, ValidatorConfig, assess,
};
use serde_json::Value;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let matches = Command::new("fhir-conformance")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Must-support assessment and profile validation for FHIR resources")
        .subcommand_required(true)
        .subcommand(
            Command::new("must-support")
                .about("Report must-support items that no resource populates")
                .arg(
                    Arg::new("ig")
                        .long("ig")
                        .value_name("PACKAGE")
                        .help("IG package.tgz holding the profile")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("profile")
                        .short('p')
                        .long("profile")
                        .value_name("URL")
                        .help("Canonical URL of the profile to assess against")
                        .required(true),
                )
                .arg(
                    Arg::new("requirement-extension")
                        .long("requirement-extension")
                        .value_name("URL")
                        .help("Extension marking requirement-only elements (e.g. USCDI)"),
                )
                .arg(
                    Arg::new("debug-metadata")
                        .long("debug-metadata")
                        .help("Print the extracted must-support metadata")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("files")
                        .value_name("FILE")
                        .help("Resource or Bundle JSON files")
                        .required(true)
                        .num_args(1..)
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("validate")
                .about("Validate a resource with an external FHIR validator")
                .arg(
                    Arg::new("profile")
                        .short('p')
                        .long("profile")
                        .value_name("URL")
                        .help("Profile to validate against (base resource profile when omitted)"),
                )
                .arg(
                    Arg::new("validator-url")
                        .long("validator-url")
                        .value_name("URL")
                        .help("Validator base URL (defaults to FHIR_RESOURCE_VALIDATOR_URL)"),
                )
                .arg(
                    Arg::new("ig")
                        .long("ig")
                        .value_name("PACKAGE_ID")
                        .help("IG package id (name#version) for the validator to load")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("file")
                        .value_name("FILE")
                        .help("Resource JSON file")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
        .get_matches();

    let passed = match matches.subcommand() {
        Some(("must-support", args)) => run_must_support(args).await?,
        Some(("validate", args)) => run_validate(args).await?,
        _ => return Err("unknown command".into()),
    };

    if !passed {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_must_support(args: &ArgMatches) -> Result<bool, Box<dyn std::error::Error>> {
    let ig_path = args.get_one::<PathBuf>("ig").ok_or("--ig is required")?;
    let profile_url = args.get_one::<String>("profile").ok_or("--profile is required")?;

    let ig = IgPackage::load(ig_path).await?;
    let mut options =
        AssessmentOptions::default().with_debug_metadata(args.get_flag("debug-metadata"));
    if let Some(url) = args.get_one::<String>("requirement-extension") {
        options = options.with_requirement_extension(url);
    }
    let assessment = MustSupportAssessment::new(&ig).with_options(options.clone());
    let metadata = assessment.metadata_for_url(profile_url)?;

    if options.debug_metadata {
        println!("{}", serde_json::to_string_pretty(&metadata)?);
    }

    let mut resources = Vec::new();
    for path in args.get_many::<PathBuf>("files").into_iter().flatten() {
        let contents = tokio::fs::read_to_string(path).await?;
        let resource: Value = serde_json::from_str(&contents)?;
        resources.extend(
            flatten_bundle(resource)
                .into_iter()
                .filter(|r| r.get("resourceType").and_then(Value::as_str) == Some(metadata.resource_type.as_str())),
        );
    }

    println!(
        "Assessing {} {} resource(s) against {}",
        resources.len(),
        metadata.resource_type,
        profile_url
    );

    if resources.is_empty() {
        println!("No {} resources found", metadata.resource_type);
        return Ok(false);
    }
    let report = assess(&resources, &metadata);
    if report.is_empty() {
        println!("All must-support items found");
        return Ok(true);
    }

    println!("{}", report.failure_message());
    for item in report.to_strings() {
        println!("  missing: {item}");
    }
    Ok(false)
}

async fn run_validate(args: &ArgMatches) -> Result<bool, Box<dyn std::error::Error>> {
    let file = args.get_one::<PathBuf>("file").ok_or("a resource file is required")?;
    let profile_url = args.get_one::<String>("profile").map(String::as_str);

    let mut config = ValidatorConfig::from_env().with_test_suite("cli");
    if let Some(url) = args.get_one::<String>("validator-url") {
        config = config.with_url(url);
    }
    let igs: Vec<String> = args
        .get_many::<String>("ig")
        .into_iter()
        .flatten()
        .cloned()
        .collect();
    if !igs.is_empty() {
        config = config.with_igs(igs);
    }
    let validator = FhirResourceValidator::builder(config).build()?;

    let contents = tokio::fs::read_to_string(file).await?;
    let resource: Value = serde_json::from_str(&contents)?;

    let mut context = RunContext::new("cli");
    let valid = validator
        .is_valid(&resource, profile_url, &mut context, true)
        .await?;

    for message in context.messages() {
        let label = match message.message_type {
            MessageType::Error => "error",
            MessageType::Warning => "warning",
            MessageType::Info => "info",
        };
        println!("[{label}] {}", message.message);
    }
    println!("{}", if valid { "Resource is valid" } else { "Resource is invalid" });
    Ok(valid)
}

/// The resource, followed by its entries when it is a Bundle.
fn flatten_bundle(resource: Value) -> Vec<Value> {
    if resource.get("resourceType").and_then(Value::as_str) != Some("Bundle") {
        return vec![resource];
    }
    let entries: Vec<Value> = resource
        .get("entry")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get("resource").cloned())
                .collect()
        })
        .unwrap_or_default();
    let mut flattened = vec![resource];
    flattened.extend(entries);
    flattened
}
