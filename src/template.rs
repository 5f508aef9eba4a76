use serde_json::{json, Map, Value};

use crate::expr::Expr;
use crate::models::{BlockDevice, IngressRule, Instance, Output, Policy, Resource, ResourceGraph, ResourceKind, Role, SecurityGroup};
use crate::stack::AMI_MAP;

pub(crate) trait ToCfn {
    fn to_cfn(&self) -> Value;
}

impl ToCfn for Expr {
    fn to_cfn(&self) -> Value {
        match self {
            Expr::Lit(s) => json!(s),
            Expr::Ref(id) => json!({ "Ref": id }),
            Expr::GetAtt(id, attribute) => json!({ "Fn::GetAtt": [id, attribute] }),
            Expr::Sub(template) => json!({ "Fn::Sub": template }),
            Expr::FindInMap(map, key, attribute) => json!({ "Fn::FindInMap": [map, key.to_cfn(), attribute] }),
            Expr::Join(delimiter, parts) => json!({ "Fn::Join": [delimiter, parts.to_cfn()] }),
            Expr::Base64(inner) => json!({ "Fn::Base64": inner.to_cfn() }),
            Expr::SelectAz(index) => json!({ "Fn::Select": [index, { "Fn::GetAZs": "" }] }),
        }
    }
}

impl<T: ToCfn> ToCfn for Vec<T> {
    fn to_cfn(&self) -> Value {
        Value::Array(self.iter().map(ToCfn::to_cfn).collect())
    }
}

impl ToCfn for IngressRule {
    fn to_cfn(&self) -> Value {
        json!({
            "CidrIp": self.cidr,
            "Description": self.description,
            "FromPort": self.port,
            "IpProtocol": self.protocol.as_str(),
            "ToPort": self.port,
        })
    }
}

impl ToCfn for SecurityGroup {
    fn to_cfn(&self) -> Value {
        let mut props = json!({
            "GroupDescription": self.description,
            "GroupName": self.group_name,
            "SecurityGroupIngress": self.ingress.to_cfn(),
            "VpcId": self.vpc.to_cfn(),
        });
        if self.allow_all_outbound {
            props["SecurityGroupEgress"] = json!([{
                "CidrIp": "0.0.0.0/0",
                "Description": "Allow all outbound traffic by default",
                "IpProtocol": "-1",
            }]);
        }
        props
    }
}

impl ToCfn for Role {
    fn to_cfn(&self) -> Value {
        json!({
            "AssumeRolePolicyDocument": {
                "Statement": [{
                    "Action": "sts:AssumeRole",
                    "Effect": "Allow",
                    "Principal": { "Service": self.assumed_by },
                }],
                "Version": "2012-10-17",
            },
            "ManagedPolicyArns": self.managed_policy_arns.to_cfn(),
            "RoleName": self.role_name,
        })
    }
}

impl ToCfn for Policy {
    fn to_cfn(&self) -> Value {
        let statements = self.statements.iter().map(|statement| json!({
            "Action": statement.actions,
            "Effect": "Allow",
            "Resource": statement.resources.to_cfn(),
        })).collect::<Vec<_>>();
        json!({
            "PolicyDocument": {
                "Statement": statements,
                "Version": "2012-10-17",
            },
            "PolicyName": self.policy_name,
            "Roles": self.roles.to_cfn(),
        })
    }
}

impl ToCfn for BlockDevice {
    fn to_cfn(&self) -> Value {
        json!({
            "DeviceName": self.device_name,
            "Ebs": {
                "DeleteOnTermination": self.delete_on_termination,
                "Encrypted": self.encrypted,
                "VolumeSize": self.size_gib,
                "VolumeType": self.volume_type.as_str(),
            },
        })
    }
}

impl ToCfn for Instance {
    fn to_cfn(&self) -> Value {
        json!({
            "BlockDeviceMappings": self.block_devices.to_cfn(),
            "IamInstanceProfile": self.iam_instance_profile.to_cfn(),
            "ImageId": self.image_id.to_cfn(),
            "InstanceType": self.instance_type,
            "KeyName": self.key_name.to_cfn(),
            "SecurityGroupIds": self.security_groups.to_cfn(),
            "SubnetId": self.subnet.to_cfn(),
            "UserData": self.user_data.to_cfn(),
        })
    }
}

impl ToCfn for ResourceKind {
    /// The resource's `Properties`
    fn to_cfn(&self) -> Value {
        match self {
            ResourceKind::Vpc { cidr_block } => json!({
                "CidrBlock": cidr_block,
                "EnableDnsHostnames": true,
                "EnableDnsSupport": true,
            }),
            ResourceKind::InternetGateway => json!({}),
            ResourceKind::GatewayAttachment { vpc, internet_gateway } => json!({
                "InternetGatewayId": internet_gateway.to_cfn(),
                "VpcId": vpc.to_cfn(),
            }),
            ResourceKind::Subnet { name, vpc, cidr_block, availability_zone, map_public_ip } => json!({
                "AvailabilityZone": availability_zone.to_cfn(),
                "CidrBlock": cidr_block,
                "MapPublicIpOnLaunch": map_public_ip,
                "Tags": [{ "Key": "aws-cdk:subnet-name", "Value": name }],
                "VpcId": vpc.to_cfn(),
            }),
            ResourceKind::RouteTable { vpc } => json!({ "VpcId": vpc.to_cfn() }),
            ResourceKind::Route { route_table, destination, gateway } => json!({
                "DestinationCidrBlock": destination,
                "GatewayId": gateway.to_cfn(),
                "RouteTableId": route_table.to_cfn(),
            }),
            ResourceKind::SubnetRouteTableAssociation { subnet, route_table } => json!({
                "RouteTableId": route_table.to_cfn(),
                "SubnetId": subnet.to_cfn(),
            }),
            ResourceKind::SecurityGroup(sg) => sg.to_cfn(),
            ResourceKind::Role(role) => role.to_cfn(),
            ResourceKind::Policy(policy) => policy.to_cfn(),
            ResourceKind::InstanceProfile { roles } => json!({ "Roles": roles.to_cfn() }),
            ResourceKind::KeyPair { key_name } => json!({ "KeyName": key_name }),
            ResourceKind::Instance(instance) => instance.to_cfn(),
        }
    }
}

impl ToCfn for Resource {
    fn to_cfn(&self) -> Value {
        let mut resource = Map::new();
        resource.insert("Type".into(), json!(self.kind.type_name()));
        let props = self.kind.to_cfn();
        if props.as_object().map_or(true, |p| !p.is_empty()) {
            resource.insert("Properties".into(), props);
        }
        if !self.depends_on.is_empty() {
            resource.insert("DependsOn".into(), json!(self.depends_on));
        }
        Value::Object(resource)
    }
}

impl ToCfn for Output {
    fn to_cfn(&self) -> Value {
        json!({
            "Description": self.label,
            "Value": self.value.to_cfn(),
        })
    }
}

/// Render a graph as a CloudFormation template
pub(crate) fn render(graph: &ResourceGraph) -> Value {
    let mut ami_map = Map::new();
    for (region, image_id) in graph.images.iter() {
        ami_map.insert(region.code().into(), json!({ "ami": image_id }));
    }
    let mut resources = Map::new();
    for resource in graph.resources() {
        resources.insert(resource.logical_id.clone(), resource.to_cfn());
    }
    let mut outputs = Map::new();
    for output in graph.outputs() {
        outputs.insert(output.logical_id(), output.to_cfn());
    }
    let mut mappings = Map::new();
    mappings.insert(AMI_MAP.into(), Value::Object(ami_map));

    json!({
        "Description": format!("Personal IPsec VPN server ({})", graph.stack_name),
        "Mappings": mappings,
        "Resources": resources,
        "Outputs": outputs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{BootstrapScript, DEFAULT_QUALIFIER};
    use crate::models::Environment;
    use crate::stack::{build_stack, SynthContext, INSTANCE_ID, SECURITY_GROUP_ID};

    fn template() -> Value {
        let ctx = SynthContext {
            profile: "personal".into(),
            qualifier: DEFAULT_QUALIFIER.into(),
            bootstrap: BootstrapScript::from_bytes(b"#!/bin/sh\n".to_vec()),
        };
        let env = Environment::new("US-PersonalIpsecVpnStack", "us-west-2", "ami-0836fd4a4a0b4f6ec");
        render(&build_stack(&ctx, &env).unwrap())
    }

    #[test]
    fn test_expr_rendering() {
        assert_eq!(Expr::reference("Vpc").to_cfn(), json!({ "Ref": "Vpc" }));
        assert_eq!(Expr::get_att("Instance", "PublicIp").to_cfn(), json!({ "Fn::GetAtt": ["Instance", "PublicIp"] }));
        assert_eq!(
            Expr::concat(vec!["a".into(), Expr::reference("B")]).to_cfn(),
            json!({ "Fn::Join": ["", ["a", { "Ref": "B" }]] }),
        );
        assert_eq!(Expr::SelectAz(0).to_cfn(), json!({ "Fn::Select": [0, { "Fn::GetAZs": "" }] }));
    }

    #[test]
    fn test_ami_map_has_one_region() {
        let template = template();
        assert_eq!(template["Mappings"]["AmiMap"], json!({ "us-west-2": { "ami": "ami-0836fd4a4a0b4f6ec" } }));
        assert_eq!(
            template["Resources"][INSTANCE_ID]["Properties"]["ImageId"],
            json!({ "Fn::FindInMap": ["AmiMap", { "Ref": "AWS::Region" }, "ami"] }),
        );
    }

    #[test]
    fn test_security_group_rendering() {
        let template = template();
        let props = &template["Resources"][SECURITY_GROUP_ID]["Properties"];
        assert_eq!(props["GroupName"], "us-west-2_PublicIPsecVpnSecGroup");
        let ingress = props["SecurityGroupIngress"].as_array().unwrap();
        assert_eq!(ingress.len(), 3);
        assert_eq!(ingress[1], json!({
            "CidrIp": "0.0.0.0/0",
            "Description": "Allow UDP port 500",
            "FromPort": 500,
            "IpProtocol": "udp",
            "ToPort": 500,
        }));
        assert_eq!(props["SecurityGroupEgress"][0]["IpProtocol"], "-1");
    }

    #[test]
    fn test_instance_rendering() {
        let template = template();
        let instance = &template["Resources"][INSTANCE_ID];
        assert_eq!(instance["Type"], "AWS::EC2::Instance");
        assert_eq!(instance["Properties"]["InstanceType"], "t4g.nano");
        assert_eq!(instance["Properties"]["BlockDeviceMappings"][0]["Ebs"], json!({
            "DeleteOnTermination": true,
            "Encrypted": true,
            "VolumeSize": 8,
            "VolumeType": "gp3",
        }));
        assert!(instance["Properties"]["UserData"]["Fn::Base64"].is_object());
        assert_eq!(instance["DependsOn"], json!(["PublicIPsecVpnEC2RoleDefaultPolicy", "PublicIPsecVpnEC2Role"]));
    }

    #[test]
    fn test_outputs_rendering() {
        let template = template();
        let outputs = template["Outputs"].as_object().unwrap();
        let ids = outputs.keys().map(String::as_str).collect::<Vec<_>>();
        assert_eq!(ids, vec![
            "IPAddress",
            "KeyPairName",
            "DownloadKeyCommand",
            "SSHcommand",
            "DownloadVPNprofileforiOSmacOS",
            "DownloadVPNprofileforWindowsLinux",
        ]);
        assert_eq!(outputs["KeyPairName"]["Value"], "us-west-2_public-ipsec-vpn-key-pair");
        assert_eq!(outputs["IPAddress"]["Value"], json!({ "Fn::GetAtt": ["Instance", "PublicIp"] }));
    }

    #[test]
    fn test_internet_gateway_has_no_properties() {
        let template = template();
        assert_eq!(template["Resources"]["PublicIPsecVpnVPCIGW"], json!({ "Type": "AWS::EC2::InternetGateway" }));
    }

    #[test]
    fn test_rendering_is_stable() {
        let a = serde_json::to_string_pretty(&template()).unwrap();
        let b = serde_json::to_string_pretty(&template()).unwrap();
        assert_eq!(a, b);
    }
}
