// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NginxDeploymentReconcileStep {
    Init,
    AfterGetDeployment,
    AfterCreateDeployment,
    AfterUpdateDeployment,
    AfterGetService,
    AfterCreateService,
    AfterGetDeploymentForStatus,
    AfterUpdateStatus,
    Done,
    Error,
}
