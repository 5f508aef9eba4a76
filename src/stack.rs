use log::debug;
use std::collections::HashMap;
use std::net::IpAddr;

use crate::asset::{BootstrapAsset, BootstrapScript};
use crate::expr::{Attributes, Expr};
use crate::models::{
    BlockDevice, Environment, IngressRule, Instance, Policy, Protocol, ResourceGraph, ResourceKind,
    Role, SecurityGroup, Statement, VolumeType,
};
use crate::region::{ImageMap, Region};
use crate::user_data::UserData;
use crate::{Error, Result};

pub const VPC_ID: &str = "PublicIPsecVpnVPC";
pub const SUBNET_ID: &str = "PublicIPsecVpnVPCasteriskSubnet1Subnet";
pub const SECURITY_GROUP_ID: &str = "PublicIPsecVpnSecGroup";
pub const ROLE_ID: &str = "PublicIPsecVpnEC2Role";
pub const POLICY_ID: &str = "PublicIPsecVpnEC2RoleDefaultPolicy";
pub const INSTANCE_PROFILE_ID: &str = "InstanceInstanceProfile";
pub const KEY_PAIR_ID: &str = "PublicIPsecVpnKeyPair";
pub const INSTANCE_ID: &str = "Instance";

pub const AMI_MAP: &str = "AmiMap";
pub const INSTANCE_TYPE: &str = "t4g.nano";
pub const ROOT_VOLUME_GIB: u32 = 8;
pub const SSH_USER: &str = "ubuntu";

const VPC_CIDR: &str = "10.0.0.0/16";
const SUBNET_CIDR: &str = "10.0.0.0/24";
const SUBNET_NAME: &str = "asterisk";
const ANY_IPV4: &str = "0.0.0.0/0";
const COMPUTE_SERVICE: &str = "ec2.amazonaws.com";
const REMOTE_MANAGEMENT_POLICY: &str = "AmazonSSMManagedInstanceCore";

pub const OUTPUT_IP_ADDRESS: &str = "IP Address";
pub const OUTPUT_KEY_PAIR_NAME: &str = "Key Pair Name";
pub const OUTPUT_DOWNLOAD_KEY: &str = "Download Key Command";
pub const OUTPUT_SSH: &str = "SSH command";
pub const OUTPUT_PROFILE_APPLE: &str = "Download VPN profile for iOS & macOS";
pub const OUTPUT_PROFILE_OTHER: &str = "Download VPN profile for Windows & Linux";

/// Settings shared by every environment in a run
#[derive(Debug, Clone)]
pub struct SynthContext {
    /// Credential profile the operator fetches the private key with
    pub profile: String,
    /// Qualifier of the bootstrap bucket assets are published to
    pub qualifier: String,
    pub bootstrap: BootstrapScript,
}

pub fn key_pair_name(region: Region) -> String {
    format!("{}_public-ipsec-vpn-key-pair", region)
}

pub fn role_name(region: Region) -> String {
    format!("{}_PublicIPsecVpnEC2Role", region)
}

pub fn security_group_name(region: Region) -> String {
    format!("{}_PublicIPsecVpnSecGroup", region)
}

/// CloudFormation stack names: a letter, then letters, digits and hyphens
fn is_valid_stack_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {},
        _ => return false,
    }
    name.len() <= 128 && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Check an environment without building anything.
pub fn validate(env: &Environment) -> Result<(Region, ImageMap)> {
    let wrap = |source: Error| Error::Configuration { stack: env.stack_name.clone(), source: Box::new(source) };
    if !is_valid_stack_name(&env.stack_name) {
        return Err(wrap(Error::InvalidStackName { stack: env.stack_name.clone() }));
    }
    let region = env.region.parse::<Region>().map_err(wrap)?;
    let images = ImageMap::single(region, &env.image_id).map_err(wrap)?;
    Ok((region, images))
}

/// Nothing is registered unless the environment validates
pub fn build_stack(ctx: &SynthContext, env: &Environment) -> Result<ResourceGraph> {
    let (region, images) = validate(env)?;
    let asset = ctx.bootstrap.asset(&ctx.qualifier);
    let mut graph = ResourceGraph::new(&env.stack_name, region, images, asset.clone());

    let key_name = key_pair_name(region);
    let key_pair = graph.add(KEY_PAIR_ID, ResourceKind::KeyPair { key_name: key_name.clone() });

    let (vpc, subnet) = add_network(&mut graph);
    let security_group = add_security_group(&mut graph, region, vpc);
    let (role, instance_profile) = add_role(&mut graph, region);
    add_instance(&mut graph, subnet, security_group, key_pair, instance_profile, &asset);
    add_asset_read_policy(&mut graph, role, &asset);
    add_outputs(&mut graph, &ctx.profile, &key_name);

    debug_assert!(graph.dangling_references().is_empty());
    debug!("{}: {} resources, {} outputs", graph.stack_name, graph.resources().len(), graph.outputs().len());
    Ok(graph)
}

/// Physical names are account-wide, so no two stacks may claim the same one.
/// Two environments in one region would both want the same key pair.
///
/// Keeps the first claimant of every name; a later graph that collides with
/// an accepted one is rejected as a whole and the rest are unaffected.
pub fn split_disjoint(graphs: Vec<ResourceGraph>) -> (Vec<ResourceGraph>, Vec<Error>) {
    let mut owners: HashMap<String, String> = HashMap::new();
    let mut accepted = vec![];
    let mut rejected = vec![];
    for graph in graphs {
        let names = graph.physical_names();
        let collision = names
            .iter()
            .find_map(|name| owners.get(name).map(|first| (name.clone(), first.clone())));
        match collision {
            Some((name, first)) => rejected.push(Error::NameCollision {
                name,
                first,
                second: graph.stack_name.clone(),
            }),
            None => {
                for name in names {
                    owners.insert(name, graph.stack_name.clone());
                }
                accepted.push(graph);
            },
        }
    }
    (accepted, rejected)
}

/// VPC with a single public subnet routed straight to an internet gateway.
/// No NAT gateways: the instance gets a public address instead.
fn add_network(graph: &mut ResourceGraph) -> (Expr, Expr) {
    let vpc = graph.add(VPC_ID, ResourceKind::Vpc { cidr_block: VPC_CIDR.into() });
    let igw = graph.add("PublicIPsecVpnVPCIGW", ResourceKind::InternetGateway);
    graph.add("PublicIPsecVpnVPCVPCGW", ResourceKind::GatewayAttachment {
        vpc: vpc.clone(),
        internet_gateway: igw.clone(),
    });
    let subnet = graph.add(SUBNET_ID, ResourceKind::Subnet {
        name: SUBNET_NAME.into(),
        vpc: vpc.clone(),
        cidr_block: SUBNET_CIDR.into(),
        availability_zone: Expr::SelectAz(0),
        map_public_ip: true,
    });
    let route_table = graph.add("PublicIPsecVpnVPCasteriskSubnet1RouteTable", ResourceKind::RouteTable { vpc: vpc.clone() });
    graph.add("PublicIPsecVpnVPCasteriskSubnet1RouteTableAssociation", ResourceKind::SubnetRouteTableAssociation {
        subnet: subnet.clone(),
        route_table: route_table.clone(),
    });
    // The route is only usable once the gateway is attached
    graph.add_with_deps("PublicIPsecVpnVPCasteriskSubnet1DefaultRoute", ResourceKind::Route {
        route_table,
        destination: ANY_IPV4.into(),
        gateway: igw,
    }, &["PublicIPsecVpnVPCVPCGW"]);
    debug!("{}: network", graph.stack_name);
    (vpc, subnet)
}

fn ingress_rules() -> Vec<IngressRule> {
    let rule = |protocol, port, description: &str| IngressRule {
        protocol,
        port,
        cidr: ANY_IPV4.into(),
        description: description.into(),
    };
    vec![
        rule(Protocol::Tcp, 22, "Allow SSH"),
        rule(Protocol::Udp, 500, "Allow UDP port 500"),
        rule(Protocol::Udp, 4500, "Allow UDP port 4500"),
    ]
}

/// Returns the group id, which is what instances are attached by
fn add_security_group(graph: &mut ResourceGraph, region: Region, vpc: Expr) -> Expr {
    graph.add(SECURITY_GROUP_ID, ResourceKind::SecurityGroup(SecurityGroup {
        group_name: security_group_name(region),
        description: "Allow SSH and inbound UDP ports 500 and 4500 for the public IPsec VPN server".into(),
        vpc,
        ingress: ingress_rules(),
        allow_all_outbound: true,
    }));
    debug!("{}: security group", graph.stack_name);
    Expr::get_att(SECURITY_GROUP_ID, "GroupId")
}

/// Role for the instance, plus the instance profile that carries it
fn add_role(graph: &mut ResourceGraph, region: Region) -> (Expr, Expr) {
    let role = graph.add(ROLE_ID, ResourceKind::Role(Role {
        role_name: role_name(region),
        assumed_by: COMPUTE_SERVICE.into(),
        managed_policy_arns: vec![
            Expr::sub(format!("arn:${{AWS::Partition}}:iam::aws:policy/{}", REMOTE_MANAGEMENT_POLICY)),
        ],
    }));
    let profile = graph.add(INSTANCE_PROFILE_ID, ResourceKind::InstanceProfile { roles: vec![role.clone()] });
    debug!("{}: role", graph.stack_name);
    (role, profile)
}

fn add_instance(
    graph: &mut ResourceGraph,
    subnet: Expr,
    security_group: Expr,
    key_pair: Expr,
    instance_profile: Expr,
    asset: &BootstrapAsset,
) {
    let mut user_data = UserData::for_linux();
    let local_path = user_data.add_s3_download(asset.bucket(), &asset.object_key);
    user_data.add_execute_file(&local_path, &asset.arguments);

    let instance = Instance {
        instance_type: INSTANCE_TYPE.into(),
        image_id: Expr::FindInMap(AMI_MAP.into(), Box::new(Expr::reference("AWS::Region")), "ami".into()),
        subnet,
        security_groups: vec![security_group],
        key_name: key_pair,
        iam_instance_profile: instance_profile,
        block_devices: vec![BlockDevice {
            device_name: "/dev/xvda".into(),
            size_gib: ROOT_VOLUME_GIB,
            encrypted: true,
            delete_on_termination: true,
            volume_type: VolumeType::Gp3,
        }],
        user_data: user_data.render(),
    };
    // The role must be able to read the script before the instance boots
    graph.add_with_deps(INSTANCE_ID, ResourceKind::Instance(instance), &[POLICY_ID, ROLE_ID]);
    debug!("{}: instance", graph.stack_name);
}

fn add_asset_read_policy(graph: &mut ResourceGraph, role: Expr, asset: &BootstrapAsset) {
    graph.add(POLICY_ID, ResourceKind::Policy(Policy {
        policy_name: POLICY_ID.into(),
        roles: vec![role],
        statements: vec![Statement {
            actions: vec!["s3:GetObject*".into(), "s3:GetBucket*".into(), "s3:List*".into()],
            resources: asset.read_resources(),
        }],
    }));
    debug!("{}: bootstrap asset {}", graph.stack_name, asset.object_key);
}

fn add_outputs(graph: &mut ResourceGraph, profile: &str, key_name: &str) {
    let public_ip = || Expr::get_att(INSTANCE_ID, "PublicIp");
    let pem = format!("{}.pem", key_name);

    graph.add_output(OUTPUT_IP_ADDRESS, public_ip());
    graph.add_output(OUTPUT_KEY_PAIR_NAME, Expr::lit(key_name));

    // The private key is stored by the engine at /ec2/keypair/{key pair id}
    graph.add_output(OUTPUT_DOWNLOAD_KEY, Expr::concat(vec![
        Expr::lit("aws ssm get-parameter --name /ec2/keypair/"),
        Expr::get_att(KEY_PAIR_ID, "KeyPairId"),
        Expr::lit(format!(
            " --with-decryption --query Parameter.Value --profile {} --output text > {} && chmod 400 {}",
            profile, pem, pem,
        )),
    ]));
    graph.add_output(OUTPUT_SSH, Expr::concat(vec![
        Expr::lit(format!("ssh -i \"{}\" {}@", pem, SSH_USER)),
        public_ip(),
    ]));

    let scp = |file: &str| Expr::concat(vec![
        Expr::lit(format!("scp -i \"{}\" {}@", pem, SSH_USER)),
        public_ip(),
        Expr::lit(format!(":{} ~/Desktop", file)),
    ]);
    graph.add_output(OUTPUT_PROFILE_APPLE, scp("vpnclient.mobileconfig"));
    graph.add_output(OUTPUT_PROFILE_OTHER, scp("vpnclient.p12"));
}

/// Values the engine would report for a deployed stack
pub fn realized_attributes(region: Region, public_ip: IpAddr, key_pair_id: &str) -> Attributes {
    let mut attrs = Attributes::default();
    attrs
        .set_ref("AWS::Region", region.code())
        .set_att(INSTANCE_ID, "PublicIp", public_ip.to_string())
        .set_att(KEY_PAIR_ID, "KeyPairId", key_pair_id);
    attrs
}

/// Evaluate every output of `graph` to a concrete string
pub fn resolve_outputs(graph: &ResourceGraph, attrs: &Attributes) -> Result<Vec<(String, String)>> {
    graph
        .outputs()
        .iter()
        .map(|output| {
            let value = output.value.resolve(attrs)
                .ok_or_else(|| Error::Unresolved { label: output.label.clone() })?;
            Ok((output.label.clone(), value))
        })
        .collect()
}
