use serde::Deserialize;

use crate::asset::BootstrapAsset;
use crate::expr::Expr;
use crate::region::{ImageMap, Region};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Environment {
    pub stack_name: String,
    pub region: String,
    pub image_id: String,
}

impl Environment {
    pub fn new(stack_name: &str, region: &str, image_id: &str) -> Environment {
        Environment {
            stack_name: stack_name.into(),
            region: region.into(),
            image_id: image_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressRule {
    pub protocol: Protocol,
    pub port: u16,
    pub cidr: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroup {
    pub group_name: String,
    pub description: String,
    pub vpc: Expr,
    pub ingress: Vec<IngressRule>,
    pub allow_all_outbound: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub role_name: String,
    pub assumed_by: String,
    pub managed_policy_arns: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub actions: Vec<String>,
    pub resources: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub policy_name: String,
    pub roles: Vec<Expr>,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeType {
    Gp3,
}

impl VolumeType {
    pub fn as_str(self) -> &'static str {
        match self {
            VolumeType::Gp3 => "gp3",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    pub device_name: String,
    pub size_gib: u32,
    pub encrypted: bool,
    pub delete_on_termination: bool,
    pub volume_type: VolumeType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub instance_type: String,
    pub image_id: Expr,
    pub subnet: Expr,
    pub security_groups: Vec<Expr>,
    pub key_name: Expr,
    pub iam_instance_profile: Expr,
    pub block_devices: Vec<BlockDevice>,
    pub user_data: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    Vpc { cidr_block: String },
    InternetGateway,
    GatewayAttachment { vpc: Expr, internet_gateway: Expr },
    Subnet { name: String, vpc: Expr, cidr_block: String, availability_zone: Expr, map_public_ip: bool },
    RouteTable { vpc: Expr },
    Route { route_table: Expr, destination: String, gateway: Expr },
    SubnetRouteTableAssociation { subnet: Expr, route_table: Expr },
    SecurityGroup(SecurityGroup),
    Role(Role),
    Policy(Policy),
    InstanceProfile { roles: Vec<Expr> },
    KeyPair { key_name: String },
    Instance(Instance),
}

impl ResourceKind {
    /// CloudFormation resource type
    pub fn type_name(&self) -> &'static str {
        match self {
            ResourceKind::Vpc { .. }                         => "AWS::EC2::VPC",
            ResourceKind::InternetGateway                    => "AWS::EC2::InternetGateway",
            ResourceKind::GatewayAttachment { .. }           => "AWS::EC2::VPCGatewayAttachment",
            ResourceKind::Subnet { .. }                      => "AWS::EC2::Subnet",
            ResourceKind::RouteTable { .. }                  => "AWS::EC2::RouteTable",
            ResourceKind::Route { .. }                       => "AWS::EC2::Route",
            ResourceKind::SubnetRouteTableAssociation { .. } => "AWS::EC2::SubnetRouteTableAssociation",
            ResourceKind::SecurityGroup(_)                   => "AWS::EC2::SecurityGroup",
            ResourceKind::Role(_)                            => "AWS::IAM::Role",
            ResourceKind::Policy(_)                          => "AWS::IAM::Policy",
            ResourceKind::InstanceProfile { .. }             => "AWS::IAM::InstanceProfile",
            ResourceKind::KeyPair { .. }                     => "AWS::EC2::KeyPair",
            ResourceKind::Instance(_)                        => "AWS::EC2::Instance",
        }
    }

    fn exprs(&self) -> Vec<&Expr> {
        match self {
            ResourceKind::Vpc { .. } | ResourceKind::InternetGateway | ResourceKind::KeyPair { .. } => vec![],
            ResourceKind::GatewayAttachment { vpc, internet_gateway } => vec![vpc, internet_gateway],
            ResourceKind::Subnet { vpc, availability_zone, .. } => vec![vpc, availability_zone],
            ResourceKind::RouteTable { vpc } => vec![vpc],
            ResourceKind::Route { route_table, gateway, .. } => vec![route_table, gateway],
            ResourceKind::SubnetRouteTableAssociation { subnet, route_table } => vec![subnet, route_table],
            ResourceKind::SecurityGroup(sg) => vec![&sg.vpc],
            ResourceKind::Role(role) => role.managed_policy_arns.iter().collect(),
            ResourceKind::Policy(policy) => {
                policy.roles.iter()
                    .chain(policy.statements.iter().flat_map(|s| s.resources.iter()))
                    .collect()
            },
            ResourceKind::InstanceProfile { roles } => roles.iter().collect(),
            ResourceKind::Instance(instance) => {
                let mut exprs = vec![
                    &instance.image_id,
                    &instance.subnet,
                    &instance.key_name,
                    &instance.iam_instance_profile,
                    &instance.user_data,
                ];
                exprs.extend(instance.security_groups.iter());
                exprs
            },
        }
    }

    /// Name chosen by us rather than the provisioning engine
    pub fn physical_name(&self) -> Option<&str> {
        match self {
            ResourceKind::SecurityGroup(sg) => Some(&sg.group_name),
            ResourceKind::Role(role) => Some(&role.role_name),
            ResourceKind::KeyPair { key_name } => Some(key_name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub logical_id: String,
    pub kind: ResourceKind,
    pub depends_on: Vec<String>,
}

impl Resource {
    pub fn dependencies(&self) -> Vec<String> {
        let mut ids = self.depends_on.clone();
        for expr in self.kind.exprs() {
            expr.referenced_ids(&mut ids);
        }
        ids.sort();
        ids.dedup();
        ids
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub label: String,
    pub value: Expr,
}

impl Output {
    pub fn logical_id(&self) -> String {
        self.label.chars().filter(char::is_ascii_alphanumeric).collect()
    }
}

/// Everything synthesized for one environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceGraph {
    pub stack_name: String,
    pub region: Region,
    pub images: ImageMap,
    pub asset: BootstrapAsset,
    resources: Vec<Resource>,
    outputs: Vec<Output>,
}

impl ResourceGraph {
    pub(crate) fn new(stack_name: &str, region: Region, images: ImageMap, asset: BootstrapAsset) -> ResourceGraph {
        ResourceGraph {
            stack_name: stack_name.to_string(),
            region,
            images,
            asset,
            resources: vec![],
            outputs: vec![],
        }
    }

    /// Register a resource and return a `Ref` to it
    pub(crate) fn add(&mut self, logical_id: &str, kind: ResourceKind) -> Expr {
        self.add_with_deps(logical_id, kind, &[])
    }

    pub(crate) fn add_with_deps(&mut self, logical_id: &str, kind: ResourceKind, depends_on: &[&str]) -> Expr {
        debug_assert!(self.resource(logical_id).is_none(), "duplicate logical id {}", logical_id);
        self.resources.push(Resource {
            logical_id: logical_id.to_string(),
            kind,
            depends_on: depends_on.iter().map(|id| id.to_string()).collect(),
        });
        Expr::reference(logical_id)
    }

    pub(crate) fn add_output(&mut self, label: &str, value: Expr) {
        self.outputs.push(Output { label: label.to_string(), value });
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.logical_id == logical_id)
    }

    /// Names that must not collide with another stack in the same account
    pub fn physical_names(&self) -> Vec<String> {
        let mut names = vec![self.stack_name.clone()];
        names.extend(self.resources.iter().filter_map(|r| r.kind.physical_name()).map(String::from));
        names
    }

    /// Dependencies that point at no registered resource
    pub fn dangling_references(&self) -> Vec<String> {
        self.resources
            .iter()
            .flat_map(Resource::dependencies)
            .filter(|id| self.resource(id).is_none())
            .collect()
    }
}

#[cfg(test)]
impl ResourceGraph {
    pub fn count_of(&self, type_name: &str) -> usize {
        self.resources.iter().filter(|r| r.kind.type_name() == type_name).count()
    }

    pub fn security_groups(&self) -> impl Iterator<Item=&SecurityGroup> {
        self.resources.iter().filter_map(|r| match &r.kind {
            ResourceKind::SecurityGroup(sg) => Some(sg),
            _ => None,
        })
    }

    pub fn roles(&self) -> impl Iterator<Item=&Role> {
        self.resources.iter().filter_map(|r| match &r.kind {
            ResourceKind::Role(role) => Some(role),
            _ => None,
        })
    }

    pub fn instances(&self) -> impl Iterator<Item=&Instance> {
        self.resources.iter().filter_map(|r| match &r.kind {
            ResourceKind::Instance(instance) => Some(instance),
            _ => None,
        })
    }
}
